//! Core data model (spec §3).
//!
//! Everything here derives `Serialize`/`Deserialize` so the reference
//! `PositionStore`/`AuditSink` implementations in `interfaces.rs` and the
//! durable paper-position file in `paper_tracker.rs` can round-trip it as
//! JSON, the way the teacher persists its domain records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Round to two decimal places. Per §9, belief arithmetic stays full-width
/// `f64` through every intermediate step; only the final stored bound is
/// rounded, and only at the storage boundary (callers decide when that is).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Politics,
    Crypto,
    Sports,
    Economics,
    Entertainment,
    Weather,
    Technology,
    World,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Politics,
        Category::Crypto,
        Category::Sports,
        Category::Economics,
        Category::Entertainment,
        Category::Weather,
        Category::Technology,
        Category::World,
        Category::Other,
    ];

    /// Per-category minimum edge in percentage points, fixed by spec §4.4.
    pub fn min_edge_baseline(self) -> f64 {
        match self {
            Category::Politics => 12.0,
            Category::Crypto => 15.0,
            Category::Sports => 10.0,
            Category::Economics => 12.0,
            Category::Entertainment => 18.0,
            Category::Weather => 8.0,
            Category::Technology => 15.0,
            Category::World => 20.0,
            Category::Other => 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

/// External identity snapshot. Owned by the connector cache in production;
/// the core only ever sees a read-only copy per evaluation (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub category: Category,
    pub current_price: f64,
    pub liquidity: f64,
    pub closes_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_outcome: Option<Outcome>,
    pub resolution_authority_clear: bool,
    pub outcome_objective: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalClass {
    Authoritative,
    Procedural,
    Quantitative,
    Interpretive,
    Speculative,
}

impl SignalClass {
    /// Impact cap: maximum proportional shift of the belief range (§4.2).
    pub fn impact_cap(self) -> f64 {
        match self {
            SignalClass::Authoritative => 0.20,
            SignalClass::Procedural => 0.15,
            SignalClass::Quantitative => 0.10,
            SignalClass::Interpretive => 0.07,
            SignalClass::Speculative => 0.03,
        }
    }

    /// Base credibility used by the classifier's strength formula (§4.1).
    pub fn credibility(self) -> f64 {
        match self {
            SignalClass::Authoritative => 1.0,
            SignalClass::Procedural => 0.8,
            SignalClass::Quantitative => 0.6,
            SignalClass::Interpretive => 0.4,
            SignalClass::Speculative => 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
            Direction::Neutral => 0.0,
        }
    }
}

/// Strength on the 1..=5 scale (spec §4.1 step 4). Construction outside
/// this range is a programmer error at the C1 boundary (spec §8 boundary
/// behaviors: "Strength 0 or 6 is ill-formed").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Strength(u8);

impl Strength {
    pub fn new(v: u8) -> Option<Self> {
        if (1..=5).contains(&v) {
            Some(Strength(v))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// A classified observation, consumed once by the Belief Engine (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub class: SignalClass,
    pub direction: Direction,
    pub strength: Strength,
    pub conflicts_with_existing: bool,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
    pub description: Option<String>,
}

/// An unresolved question whose presence penalizes confidence (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unknown {
    pub id: String,
    pub description: String,
    pub added_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Per-market belief (§3). Invariants I1-I4 are enforced by `belief.rs`,
/// never by direct field mutation from outside that module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefState {
    pub belief_low: f64,
    pub belief_high: f64,
    pub confidence: f64,
    pub unknowns: Vec<Unknown>,
    pub signal_history: Vec<Signal>,
    pub last_updated: DateTime<Utc>,
    pub last_signal: Option<Signal>,
}

impl BeliefState {
    pub fn new(belief_low: f64, belief_high: f64, confidence: f64, now: DateTime<Utc>) -> Self {
        Self {
            belief_low,
            belief_high,
            confidence,
            unknowns: Vec::new(),
            signal_history: Vec::new(),
            last_updated: now,
            last_signal: None,
        }
    }

    pub fn width(&self) -> f64 {
        self.belief_high - self.belief_low
    }

    pub fn midpoint(&self) -> f64 {
        (self.belief_low + self.belief_high) / 2.0
    }

    /// Count of unresolved unknowns - the confidence-penalizing population
    /// (§3: "the presence must penalize confidence"), exposed so callers
    /// outside `belief.rs` (the paper tracker, at fill time) don't have to
    /// re-derive it by hand.
    pub fn active_unknowns(&self) -> usize {
        self.unknowns.iter().filter(|u| u.resolved_at.is_none()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
    None,
}

/// Tagged exit-condition variants (§3, §4.4). A closed sum, never subtype
/// polymorphism, per the §9 design note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitCondition {
    /// Belief mid-point moves `belief_shift_pct` percentage points against
    /// the position.
    Invalidation { belief_shift_pct: f64 },
    /// Market price crosses `price_target` toward the resolution value.
    Profit { price_target: f64 },
    /// HALT or liquidity collapse below half of `MIN_LIQUIDITY`.
    Emergency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub side: Side,
    pub size_usd: f64,
    pub entry_price: f64,
    pub exit_conditions: Vec<ExitCondition>,
    pub rationale: String,
    pub rationale_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl TradeDecision {
    /// `sha256(rationale)` hex digest, so the rationale is tamper-evident
    /// without pulling in a full audit-chain crate for one field.
    pub fn hash_rationale(rationale: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(rationale.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Win,
    Loss,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub entry_price: f64,
    pub belief_low: f64,
    pub belief_high: f64,
    pub edge_at_entry: f64,
    /// `BeliefState.confidence` at the moment of fill - carried through to
    /// `CalibrationRecord.confidence_at_entry` for the §4.7 confidence-bucket
    /// halt check (HC2), which compares win rate between a `>=85` and a
    /// `<=60` confidence bucket.
    pub confidence_at_entry: f64,
    /// `BeliefState.active_unknowns()` at the moment of fill - carried
    /// through to `CalibrationRecord.unknowns_count` for the §4.7
    /// `unknown_density` metric and HC4.
    pub unknowns_count: usize,
    pub size_usd: f64,
    pub entry_ts: DateTime<Utc>,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub resolved_ts: Option<DateTime<Utc>>,
    pub pnl: Option<f64>,
    pub actual_outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub market_id: String,
    pub category: Category,
    pub belief_at_entry: (f64, f64),
    pub confidence_at_entry: f64,
    pub unknowns_count: usize,
    pub actual_outcome: Outcome,
    pub side: Side,
    pub resolved_ts: DateTime<Utc>,
    pub edge_at_entry: f64,
    /// Whether this resolution's belief had already crossed the §3/§4.4
    /// `Invalidation` exit threshold (midpoint shift `>= 50%` against the
    /// position) by the time it resolved - the input HC3 (§4.7) partitions
    /// by category to detect three consecutive same-category invalidations.
    pub invalidation_triggered: bool,
}
