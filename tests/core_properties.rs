//! Integration tests for cross-module properties (spec §8 laws): a
//! rejected trade never mutates state, belief updates are deterministic
//! given identical inputs, and the paper-position ledger round-trips a
//! restart exactly.

use beliefbot_core::calibration::CalibrationMonitor;
use beliefbot_core::config::Config;
use beliefbot_core::decision::{CapitalContext, Evaluation, TradeDecisionEngine};
use beliefbot_core::models::{BeliefState, Category, Market, Outcome, Side};
use beliefbot_core::paper_tracker::PaperTracker;
use beliefbot_core::settings_actor::SettingsActor;
use chrono::Utc;
use tempfile::tempdir;

fn market(price: f64) -> Market {
    Market {
        id: "m1".to_string(),
        question: "Will X happen?".to_string(),
        category: Category::Crypto,
        current_price: price,
        liquidity: 20_000.0,
        closes_at: None,
        resolved_at: None,
        resolution_outcome: None,
        resolution_authority_clear: true,
        outcome_objective: true,
    }
}

fn capital() -> CapitalContext {
    CapitalContext {
        capital_usd: 10_000.0,
        kelly_fraction: 0.25,
        max_position_pct: 0.10,
        min_position_usd: 1.0,
        max_position_usd: 100.0,
    }
}

/// Idempotence of NO_TRADE (§8): evaluating the same belief/market twice
/// with no state mutation between calls produces the same rejection both
/// times, and never silently turns into a trade on a second look.
#[test]
fn no_trade_evaluation_is_idempotent() {
    let cfg = Config::default();
    let settings = SettingsActor::new();
    let engine = TradeDecisionEngine::new(&cfg, &settings);
    let belief = BeliefState::new(65.0, 80.0, 50.0, Utc::now());
    let m = market(40.0);

    let first = engine.evaluate(&belief, &m, &capital(), Utc::now());
    let second = engine.evaluate(&belief, &m, &capital(), Utc::now());

    match (first, second) {
        (Evaluation::NoTrade(a), Evaluation::NoTrade(b)) => assert_eq!(a, b),
        other => panic!("expected two identical NO_TRADEs, got {other:?}"),
    }
}

/// Determinism law (§8): identical belief + market + config inputs always
/// evaluate to the same decision, independent of wall-clock call order.
#[test]
fn evaluation_is_deterministic_given_identical_inputs() {
    let cfg = Config::default();
    let settings = SettingsActor::new();
    let engine = TradeDecisionEngine::new(&cfg, &settings);
    let belief = BeliefState::new(65.0, 80.0, 90.0, Utc::now());
    let m = market(40.0);
    let now = Utc::now();

    let a = engine.evaluate(&belief, &m, &capital(), now);
    let b = engine.evaluate(&belief, &m, &capital(), now);

    match (a, b) {
        (Evaluation::Trade(da), Evaluation::Trade(db)) => {
            assert_eq!(da.side, db.side);
            assert_eq!(da.size_usd, db.size_usd);
            assert_eq!(da.entry_price, db.entry_price);
        }
        other => panic!("expected two identical trades, got {other:?}"),
    }
}

/// Round-trip law (§8): the paper-position store recovers an open
/// position's full field set exactly after a simulated restart (a fresh
/// `PaperTracker::load` over the same file).
#[test]
fn paper_ledger_round_trips_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let cfg = Config {
        position_store_path: path.to_string_lossy().to_string(),
        ..Config::default()
    };

    let before = {
        let mut tracker = PaperTracker::load(&cfg).unwrap();
        let position = beliefbot_core::models::PaperPosition {
            id: "p1".to_string(),
            market_id: "m1".to_string(),
            side: Side::Yes,
            entry_price: 40.0,
            belief_low: 65.0,
            belief_high: 80.0,
            edge_at_entry: 25.0,
            confidence_at_entry: 82.0,
            unknowns_count: 0,
            size_usd: 50.0,
            entry_ts: Utc::now(),
            status: beliefbot_core::models::PositionStatus::Open,
            exit_price: None,
            resolved_ts: None,
            pnl: None,
            actual_outcome: None,
        };
        tracker.register(position.clone()).unwrap();
        position
    };

    let after = PaperTracker::load(&cfg).unwrap();
    let recovered = after
        .open_positions()
        .find(|p| p.id == before.id)
        .expect("position survives restart");

    assert_eq!(recovered.market_id, before.market_id);
    assert_eq!(recovered.side, before.side);
    assert_eq!(recovered.entry_price, before.entry_price);
    assert_eq!(recovered.size_usd, before.size_usd);
    assert_eq!(recovered.status, before.status);
}

/// End-to-end resolution feeds a `CalibrationRecord` into the monitor and
/// three consecutive same-category invalidation exits force a halt (HC3,
/// spec §4.7).
#[test]
fn calibration_monitor_halts_on_three_consecutive_invalidations() {
    let cfg = Config::default();
    let mut monitor = CalibrationMonitor::new(
        cfg.calibration_window,
        cfg.range_coverage_target,
        cfg.range_coverage_tolerance_pp,
        cfg.range_coverage_min_records,
        cfg.bucket_min_records,
        cfg.unknown_density_window,
    );
    let settings = SettingsActor::new();

    let dir = tempdir().unwrap();
    let mut tracker = PaperTracker::load(&Config {
        position_store_path: dir.path().join("ledger.jsonl").to_string_lossy().to_string(),
        ..Config::default()
    })
    .unwrap();

    for i in 0..3 {
        let position = beliefbot_core::models::PaperPosition {
            id: format!("p{i}"),
            market_id: "m1".to_string(),
            side: Side::Yes,
            entry_price: 40.0,
            belief_low: 65.0,
            belief_high: 80.0,
            edge_at_entry: 25.0,
            confidence_at_entry: 70.0,
            unknowns_count: 0,
            size_usd: 50.0,
            entry_ts: Utc::now(),
            status: beliefbot_core::models::PositionStatus::Open,
            exit_price: None,
            resolved_ts: None,
            pnl: None,
            actual_outcome: None,
        };
        tracker.register(position).unwrap();
        let record = tracker
            .resolve(&format!("p{i}"), Outcome::No, Category::Crypto, true, Utc::now())
            .unwrap();
        let halt = monitor.record(record, &settings);
        if i == 2 {
            assert!(halt.is_some());
        }
    }
}
