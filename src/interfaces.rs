//! External interfaces (spec §6).
//!
//! Every boundary the core talks across is a trait, never a concrete
//! connector - production wiring (real Polymarket REST, real RSS/HN
//! pollers, a real CSV audit writer) is out of scope (§1 Non-goals); what's
//! here is the trait surface plus the minimal in-memory doubles used by
//! tests and the CLI's paper-only default run. Grounded on the teacher's
//! `async_trait`-based connector traits in `scrapers/mod.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::classifier::RawItem;
use crate::error::CoreError;
use crate::models::{Market, PaperPosition};

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<Vec<Market>, CoreError>;
}

#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn poll(&self, market_id: &str) -> Result<Vec<RawItem>, CoreError>;
}

/// Abstracts wall-clock time so belief decay and signal-history age are
/// deterministic in tests (§9: "the core takes `now` as a parameter
/// everywhere, never calls the clock itself").
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OrderAck {
    Accepted { order_id: String },
    Rejected { reason: String },
}

#[async_trait]
pub trait OrderConnector: Send + Sync {
    async fn place_limit_order(
        &self,
        market_id: &str,
        side: crate::models::Side,
        limit_price: f64,
        size_usd: f64,
    ) -> Result<OrderAck, CoreError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), CoreError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save(&self, position: &PaperPosition) -> Result<(), CoreError>;
    async fn load_all(&self) -> Result<Vec<PaperPosition>, CoreError>;
}

/// One audit-trail row (§6: "ts, event, market_id, question, action,
/// detail, belief_low, belief_high, edge, size_usd, pnl"). Fields that
/// don't apply to a given event (e.g. `pnl` on a `signal_ingested` row)
/// are `None` rather than `0.0`, so a reader can't mistake "not applicable"
/// for "zero".
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub event: String,
    pub market_id: String,
    pub question: String,
    pub action: String,
    pub detail: String,
    pub belief_low: Option<f64>,
    pub belief_high: Option<f64>,
    pub edge: Option<f64>,
    pub size_usd: Option<f64>,
    pub pnl: Option<f64>,
}

impl AuditEvent {
    /// Bare event with no market context (`system_start`, `system_halt`,
    /// `calibration_report`, `error`).
    pub fn system(event: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            event: event.into(),
            market_id: String::new(),
            question: String::new(),
            action: String::new(),
            detail: detail.into(),
            belief_low: None,
            belief_high: None,
            edge: None,
            size_usd: None,
            pnl: None,
        }
    }

    /// Per-market event carrying belief/edge context but no trade size or
    /// P&L (`signal_ingested`, `belief_updated`, `market_evaluated`,
    /// `trade_opportunity`).
    #[allow(clippy::too_many_arguments)]
    pub fn market(
        event: impl Into<String>,
        market_id: impl Into<String>,
        question: impl Into<String>,
        action: impl Into<String>,
        detail: impl Into<String>,
        belief_low: Option<f64>,
        belief_high: Option<f64>,
        edge: Option<f64>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            event: event.into(),
            market_id: market_id.into(),
            question: question.into(),
            action: action.into(),
            detail: detail.into(),
            belief_low,
            belief_high,
            edge,
            size_usd: None,
            pnl: None,
        }
    }

    /// A filled trade (`trade_executed`) - adds `size_usd`, no `pnl` yet.
    #[allow(clippy::too_many_arguments)]
    pub fn trade(
        market_id: impl Into<String>,
        question: impl Into<String>,
        action: impl Into<String>,
        detail: impl Into<String>,
        belief_low: f64,
        belief_high: f64,
        edge: f64,
        size_usd: f64,
    ) -> Self {
        Self {
            ts: Utc::now(),
            event: "trade_executed".to_string(),
            market_id: market_id.into(),
            question: question.into(),
            action: action.into(),
            detail: detail.into(),
            belief_low: Some(belief_low),
            belief_high: Some(belief_high),
            edge: Some(edge),
            size_usd: Some(size_usd),
            pnl: None,
        }
    }

    /// A resolved position (`position_resolved`) - adds the realized `pnl`.
    #[allow(clippy::too_many_arguments)]
    pub fn resolution(
        market_id: impl Into<String>,
        question: impl Into<String>,
        action: impl Into<String>,
        detail: impl Into<String>,
        belief_low: f64,
        belief_high: f64,
        edge: f64,
        size_usd: f64,
        pnl: f64,
    ) -> Self {
        Self {
            ts: Utc::now(),
            event: "position_resolved".to_string(),
            market_id: market_id.into(),
            question: question.into(),
            action: action.into(),
            detail: detail.into(),
            belief_low: Some(belief_low),
            belief_high: Some(belief_high),
            edge: Some(edge),
            size_usd: Some(size_usd),
            pnl: Some(pnl),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), CoreError>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
