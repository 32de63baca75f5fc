//! Per-market orchestrator (§2 data-flow table, §5 concurrency model).
//!
//! One `MarketOrchestrator` per market id, owned by its own Rust task in
//! production (§5: "one Rust task per market id; there is no shared
//! mutable belief state across markets"). This module is the straight-line
//! tick the spec's distillation implies but never names as its own
//! [MODULE]; it exists purely to wire C1 -> C3 -> C2 -> C3 -> C4 ->
//! (C5 -> C6) -> C3 in the documented order, with every suspension point
//! (awaiting a connector, awaiting an order ack) an explicit `await`.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::belief::{self, BeliefUpdateOutcome};
use crate::calibration::{CalibrationMonitor, HaltCondition};
use crate::classifier::{RawItem, SignalClassifier};
use crate::config::Config;
use crate::decision::{self, CapitalContext, Evaluation, TradeDecisionEngine};
use crate::error::{CoreError, ErrorPolicy};
use crate::execution::ExecutionSlot;
use crate::interfaces::{AuditEvent, AuditSink, NotificationSink};
use crate::models::{BeliefState, Market, Outcome};
use crate::paper_tracker::PaperTracker;
use crate::settings_actor::SettingsActor;
use crate::state_machine::{MarketStateMachine, State};

/// The external sinks a tick/resolve call needs (§6). Bundled so the
/// growing parameter list at each call site stays a single borrow rather
/// than two more positional arguments.
pub struct AuditChannels<'a> {
    pub sink: &'a dyn AuditSink,
    pub notify: &'a dyn NotificationSink,
}

/// Persist `f` with retry-then-halt on `PersistenceFailure` (§7): retry up
/// to `cfg.persistence_retry_attempts` times with doubling backoff, and on
/// exhaustion force the state machine into HALT before propagating the
/// error - so the next tick never attempts an illegal transition out of
/// whatever state the failed persist left the machine in.
async fn persist_with_retry<T>(
    state_machine: &mut MarketStateMachine,
    cfg: &Config,
    mut f: impl FnMut() -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let mut attempt = 0;
    let mut backoff_ms = cfg.persistence_retry_backoff_ms;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.policy() == ErrorPolicy::RetryThenHalt => {
                attempt += 1;
                if attempt > cfg.persistence_retry_attempts {
                    state_machine.force_halt(e.to_string());
                    return Err(e);
                }
                warn!(attempt, error = %e, "persistence failure, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
            Err(e) => {
                state_machine.force_halt(e.to_string());
                return Err(e);
            }
        }
    }
}

/// Per-market mutable state the orchestrator owns outright. No field here
/// is ever shared with another market's orchestrator.
pub struct MarketOrchestrator {
    pub market_id: String,
    pub state_machine: MarketStateMachine,
    pub belief: BeliefState,
    pub execution: ExecutionSlot,
    keywords: Vec<String>,
}

impl MarketOrchestrator {
    pub fn new(market_id: impl Into<String>, keywords: Vec<String>, now: DateTime<Utc>) -> Self {
        let market_id = market_id.into();
        Self {
            state_machine: MarketStateMachine::new(market_id.clone()),
            belief: BeliefState::new(50.0, 50.0, 50.0, now),
            execution: ExecutionSlot::new(),
            keywords,
            market_id,
        }
    }

    /// One full tick: ingest whatever `items` arrived since the last poll,
    /// update belief, evaluate and (maybe) execute a trade, and leave the
    /// state machine wherever that sequence lands it. Returns `true` if a
    /// trade was executed this tick.
    #[allow(clippy::too_many_arguments)]
    pub async fn tick(
        &mut self,
        market: &Market,
        items: &[RawItem],
        classifier: &SignalClassifier,
        cfg: &Config,
        settings: &SettingsActor,
        tracker: &mut PaperTracker,
        capital: &CapitalContext,
        audit: &AuditChannels<'_>,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        if self.state_machine.is_halted() {
            return Ok(false);
        }

        self.belief = belief::decay_confidence(&self.belief, now);

        if items.is_empty() {
            return Ok(false);
        }

        self.state_machine.transition(State::IngestSignal, "items polled");
        let _ = audit
            .sink
            .record(&AuditEvent::market(
                "signal_ingested",
                market.id.as_str(),
                market.question.as_str(),
                "INGEST",
                format!("{} item(s) polled", items.len()),
                None,
                None,
                None,
            ))
            .await;

        // A tick's whole item batch is processed inside a single
        // IngestSignal -> UpdateBelief step, not one transition per
        // classified item - UpdateBelief has no self-transition and
        // Observe only accepts IngestSignal (state_machine.rs), so
        // re-entering either per item would force an illegal-transition
        // HALT on the second signal of a multi-signal tick (spec.md:144,
        // "UPDATE_BELIEF -> OBSERVE ... handles multi-signal batches
        // between trade evaluations").
        let mut classified_any = false;
        let mut applied_any = false;
        let mut entered_update_belief = false;
        for item in items {
            let Some(signal) = classifier.classify(item, &self.keywords, &self.belief.signal_history)
            else {
                continue;
            };
            classified_any = true;

            if !entered_update_belief {
                self.state_machine
                    .transition(State::UpdateBelief, "signal eligible");
                entered_update_belief = true;
            }

            match belief::apply_signal(&self.belief, signal, now, cfg) {
                Ok(BeliefUpdateOutcome::Applied(new_state)) => {
                    self.belief = new_state;
                    applied_any = true;
                    let _ = audit
                        .sink
                        .record(&AuditEvent::market(
                            "belief_updated",
                            market.id.as_str(),
                            market.question.as_str(),
                            "UPDATE",
                            "signal applied",
                            Some(self.belief.belief_low),
                            Some(self.belief.belief_high),
                            None,
                        ))
                        .await;
                }
                Ok(BeliefUpdateOutcome::Rejected { reason }) => {
                    info!(market_id = %self.market_id, reason, "signal rejected");
                    continue;
                }
                Err(e) => {
                    self.state_machine.force_halt(e.to_string());
                    let _ = audit
                        .sink
                        .record(&AuditEvent::system("error", e.to_string()))
                        .await;
                    return Err(e);
                }
            }
        }

        if !classified_any {
            // No item reached C2 at all this tick - the rejection path
            // runs straight from IngestSignal, never entering UpdateBelief.
            self.state_machine
                .transition(State::Observe, "no eligible signal this tick");
            return Ok(false);
        }

        if !applied_any {
            self.state_machine
                .transition(State::Observe, "no signal changed belief");
            return Ok(false);
        }

        self.state_machine
            .transition(State::EvaluateTrade, "belief updated");

        let engine = TradeDecisionEngine::new(cfg, settings);
        let evaluation = engine.evaluate(&self.belief, market, capital, now);

        let decision = match evaluation {
            Evaluation::NoTrade(reason) => {
                info!(market_id = %self.market_id, reason = reason.as_str(), "no trade");
                let _ = audit
                    .sink
                    .record(&AuditEvent::market(
                        "market_evaluated",
                        market.id.as_str(),
                        market.question.as_str(),
                        "NO_TRADE",
                        reason.as_str(),
                        Some(self.belief.belief_low),
                        Some(self.belief.belief_high),
                        None,
                    ))
                    .await;
                self.state_machine
                    .transition(State::Observe, reason.as_str());
                return Ok(false);
            }
            Evaluation::Trade(d) => d,
        };

        let edge = decision::compute_edge(&self.belief, decision.side, market.current_price);
        let _ = audit
            .sink
            .record(&AuditEvent::market(
                "trade_opportunity",
                market.id.as_str(),
                market.question.as_str(),
                "TRADE",
                decision.rationale.as_str(),
                Some(self.belief.belief_low),
                Some(self.belief.belief_high),
                Some(edge),
            ))
            .await;

        self.state_machine
            .transition(State::ExecuteTrade, "trade eligible");

        let order = match self.execution.execute(&decision, market.id.clone(), now) {
            Ok(o) => o,
            Err(e) => {
                warn!(market_id = %self.market_id, error = %e, "execution rejected");
                self.state_machine.transition(State::Observe, e.to_string());
                return Ok(false);
            }
        };

        // Paper trading fills immediately at the quoted limit price - there
        // is no real order book to wait on (§1 Non-goals: "real order
        // routing / live capital").
        let mut position = match self.execution.on_fill(&decision, market.id.clone(), true, now)? {
            Some(p) => p,
            None => {
                self.state_machine.transition(State::Observe, "fill produced no position");
                return Ok(false);
            }
        };
        position.belief_low = self.belief.belief_low;
        position.belief_high = self.belief.belief_high;
        position.confidence_at_entry = self.belief.confidence;
        position.unknowns_count = self.belief.active_unknowns();
        position.edge_at_entry = edge;

        let size_usd = position.size_usd;
        persist_with_retry(&mut self.state_machine, cfg, || {
            tracker.register(position.clone())
        })
        .await?;
        info!(market_id = %self.market_id, order_id = %order.id, "trade executed");
        let _ = audit
            .sink
            .record(&AuditEvent::trade(
                market.id.as_str(),
                market.question.as_str(),
                "TRADE",
                order.id.as_str(),
                self.belief.belief_low,
                self.belief.belief_high,
                edge,
                size_usd,
            ))
            .await;

        self.state_machine
            .transition(State::Monitor, "order filled");
        self.state_machine
            .transition(State::Observe, "monitor complete");

        Ok(true)
    }

    /// Resolve a closed market against its realized outcome, feeding the
    /// result to the Paper Tracker and then the Calibration Monitor.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve(
        &mut self,
        market: &Market,
        actual_outcome: Outcome,
        tracker: &mut PaperTracker,
        calibration: &mut CalibrationMonitor,
        settings: &SettingsActor,
        cfg: &Config,
        audit: &AuditChannels<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<HaltCondition>, CoreError> {
        let Some(position) = self.execution.open_position().cloned() else {
            return Ok(None);
        };

        let invalidation_triggered = decision::invalidation_breached(
            position.belief_low,
            position.belief_high,
            &self.belief,
            position.side,
            50.0,
        );

        let record = persist_with_retry(&mut self.state_machine, cfg, || {
            tracker.resolve(
                &position.id,
                actual_outcome,
                market.category,
                invalidation_triggered,
                now,
            )
        })
        .await?;

        // §4.6: exit_price is the settled probability (100/0), not the
        // last-observed market price - mirrors paper_tracker::resolve.
        let won = matches!(
            (position.side, actual_outcome),
            (crate::models::Side::Yes, Outcome::Yes) | (crate::models::Side::No, Outcome::No)
        );
        let exit_price = if won { 100.0 } else { 0.0 };
        let pnl = match position.side {
            crate::models::Side::Yes => {
                (exit_price - position.entry_price) * position.size_usd / 100.0
            }
            crate::models::Side::No => {
                (position.entry_price - exit_price) * position.size_usd / 100.0
            }
            crate::models::Side::None => 0.0,
        };
        let _ = audit
            .sink
            .record(&AuditEvent::resolution(
                market.id.as_str(),
                market.question.as_str(),
                if won { "WIN" } else { "LOSS" },
                "position resolved",
                position.belief_low,
                position.belief_high,
                position.edge_at_entry,
                position.size_usd,
                pnl,
            ))
            .await;

        let halt = calibration.record(record, settings);
        if let Some(cond) = halt {
            error!(market_id = %self.market_id, ?cond, "calibration halt condition triggered");
            self.state_machine.force_halt(format!("{cond:?}"));
            let _ = audit
                .sink
                .record(&AuditEvent::system(
                    "system_halt",
                    format!("{:?} on market {}", cond, market.id),
                ))
                .await;
            audit
                .notify
                .notify(&format!("HALT: {cond:?} on market {}", market.id))
                .await
                .ok();
        }
        Ok(halt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{InMemoryAuditSink, LoggingNotificationSink};
    use crate::classifier::Origin;
    use crate::models::Category;

    fn audit_channels(sink: &InMemoryAuditSink, notify: &LoggingNotificationSink) -> AuditChannels<'_> {
        AuditChannels { sink, notify }
    }

    fn market() -> Market {
        Market {
            id: "m1".to_string(),
            question: "Will X happen?".to_string(),
            category: Category::Crypto,
            current_price: 40.0,
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

    #[tokio::test]
    async fn empty_tick_leaves_state_in_observe() {
        let now = Utc::now();
        let mut orch = MarketOrchestrator::new("m1", vec!["election".to_string()], now);
        let cfg = Config::default();
        let settings = SettingsActor::new();
        let classifier = SignalClassifier::new();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg_for_tracker = cfg.clone();
        cfg_for_tracker.position_store_path =
            dir.path().join("ledger.jsonl").to_string_lossy().to_string();
        let mut tracker = PaperTracker::load(&cfg_for_tracker).unwrap();
        let sink = InMemoryAuditSink::new();
        let notify = LoggingNotificationSink;
        let audit = audit_channels(&sink, &notify);

        let traded = orch
            .tick(
                &market(),
                &[],
                &classifier,
                &cfg,
                &settings,
                &mut tracker,
                &capital(),
                &audit,
                now,
            )
            .await
            .unwrap();
        assert!(!traded);
        assert_eq!(orch.state_machine.state, State::Observe);
    }

    #[tokio::test]
    async fn halted_market_ignores_further_ticks() {
        let now = Utc::now();
        let mut orch = MarketOrchestrator::new("m1", vec![], now);
        orch.state_machine.force_halt("test halt");
        let cfg = Config::default();
        let settings = SettingsActor::new();
        let classifier = SignalClassifier::new();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg_for_tracker = cfg.clone();
        cfg_for_tracker.position_store_path =
            dir.path().join("ledger.jsonl").to_string_lossy().to_string();
        let mut tracker = PaperTracker::load(&cfg_for_tracker).unwrap();
        let sink = InMemoryAuditSink::new();
        let notify = LoggingNotificationSink;
        let audit = audit_channels(&sink, &notify);

        let item = RawItem {
            source: "sec.gov".to_string(),
            published_at: now,
            title: "election rule approved".to_string(),
            body: "the commission approved the rule".to_string(),
            origin: Origin::Polling,
        };
        let traded = orch
            .tick(
                &market(),
                &[item],
                &classifier,
                &cfg,
                &settings,
                &mut tracker,
                &capital(),
                &audit,
                now,
            )
            .await
            .unwrap();
        assert!(!traded);
        assert!(orch.state_machine.is_halted());
    }

    #[tokio::test]
    async fn multi_signal_tick_does_not_halt() {
        let now = Utc::now();
        let mut orch = MarketOrchestrator::new("m1", vec!["election".to_string()], now);
        let cfg = Config::default();
        let settings = SettingsActor::new();
        let classifier = SignalClassifier::new();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg_for_tracker = cfg.clone();
        cfg_for_tracker.position_store_path =
            dir.path().join("ledger.jsonl").to_string_lossy().to_string();
        let mut tracker = PaperTracker::load(&cfg_for_tracker).unwrap();
        let sink = InMemoryAuditSink::new();
        let notify = LoggingNotificationSink;
        let audit = audit_channels(&sink, &notify);

        let items = vec![
            RawItem {
                source: "sec.gov".to_string(),
                published_at: now,
                title: "election rule approved".to_string(),
                body: "the commission approved the rule".to_string(),
                origin: Origin::Polling,
            },
            RawItem {
                source: "sec.gov".to_string(),
                published_at: now,
                title: "election rule confirmed".to_string(),
                body: "a second filing confirmed the rule".to_string(),
                origin: Origin::Polling,
            },
        ];

        let traded = orch
            .tick(
                &market(),
                &items,
                &classifier,
                &cfg,
                &settings,
                &mut tracker,
                &capital(),
                &audit,
                now,
            )
            .await
            .unwrap();

        assert!(!orch.state_machine.is_halted());
        let _ = traded;
    }
}
