//! Execution Layer (C5, spec §4.5).
//!
//! Turns one `TradeDecision` into at most one resting limit order per
//! market, forwards fills to the Paper Trading Tracker, and never touches
//! `BeliefState`. Grounded on the teacher's `vault/trade_executor.rs`
//! single-order lifecycle (`pending -> partial -> filled|cancelled`), cut
//! down to the one-position-per-market rule this spec requires - no
//! averaging down, no order book, no replace/reduce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{PaperPosition, PositionStatus, Side, TradeDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Partial,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market_id: String,
    pub side: Side,
    pub limit_price: f64,
    pub size_usd: f64,
    pub state: OrderState,
    pub placed_at: DateTime<Utc>,
}

/// One open order per market, enforced by the caller holding exactly one
/// `ExecutionSlot` per market task (§5: "per-market task ownership").
#[derive(Debug, Default)]
pub struct ExecutionSlot {
    order: Option<Order>,
    position: Option<PaperPosition>,
}

impl ExecutionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_open_position(&self) -> bool {
        self.position
            .as_ref()
            .map(|p| p.status == PositionStatus::Open)
            .unwrap_or(false)
    }

    /// Place a single limit order from a `TradeDecision`. Rejects a
    /// `Side::None` decision outright and rejects any attempt to open a
    /// second position on a market that already holds one open (§4.5: "no
    /// averaging down; a second TradeDecision for an occupied market is
    /// rejected, not merged").
    pub fn execute(
        &mut self,
        decision: &TradeDecision,
        market_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Order, CoreError> {
        if decision.side == Side::None {
            return Err(CoreError::OrderRejected(
                "cannot execute a NONE-side decision".into(),
            ));
        }
        if self.has_open_position() {
            return Err(CoreError::DuplicatePosition(market_id.into()));
        }

        let market_id = market_id.into();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            market_id,
            side: decision.side,
            limit_price: decision.entry_price,
            size_usd: decision.size_usd,
            state: OrderState::Pending,
            placed_at: now,
        };
        self.order = Some(order.clone());
        Ok(order)
    }

    /// Cancel the resting order. Refuses once the order has already
    /// filled - cancellation is a pre-fill action only.
    pub fn cancel_order(&mut self) -> Result<(), CoreError> {
        match &mut self.order {
            Some(o) if o.state == OrderState::Filled => Err(CoreError::OrderRejected(
                "cannot cancel an already-filled order".into(),
            )),
            Some(o) => {
                o.state = OrderState::Cancelled;
                self.order = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// A fill (partial or full) transitions order state and, on full fill,
    /// registers a new `PaperPosition` with the Paper Trading Tracker.
    pub fn on_fill(
        &mut self,
        decision: &TradeDecision,
        market_id: impl Into<String>,
        fully_filled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<PaperPosition>, CoreError> {
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| CoreError::OrderRejected("no resting order to fill".into()))?;

        if order.state == OrderState::Cancelled {
            return Err(CoreError::OrderRejected(
                "cannot fill a cancelled order".into(),
            ));
        }

        order.state = if fully_filled {
            OrderState::Filled
        } else {
            OrderState::Partial
        };

        if !fully_filled {
            return Ok(None);
        }

        // `belief_low`/`belief_high`/`confidence_at_entry`/`unknowns_count`/
        // `edge_at_entry` are all zeroed here and overwritten by the caller
        // right after `on_fill` returns (orchestrator.rs) - the execution
        // layer never reads `BeliefState` (§4.5: "execution cannot mutate
        // BeliefState"), so it has no belief to read these from either.
        let position = PaperPosition {
            id: Uuid::new_v4().to_string(),
            market_id: market_id.into(),
            side: decision.side,
            entry_price: decision.entry_price,
            belief_low: 0.0,
            belief_high: 0.0,
            edge_at_entry: 0.0,
            confidence_at_entry: 0.0,
            unknowns_count: 0,
            size_usd: decision.size_usd,
            entry_ts: now,
            status: PositionStatus::Open,
            exit_price: None,
            resolved_ts: None,
            pnl: None,
            actual_outcome: None,
        };
        self.position = Some(position.clone());
        Ok(Some(position))
    }

    pub fn open_position(&self) -> Option<&PaperPosition> {
        self.position.as_ref()
    }

    pub fn current_order(&self) -> Option<&Order> {
        self.order.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExitCondition;

    fn decision(side: Side, price: f64) -> TradeDecision {
        TradeDecision {
            side,
            size_usd: 50.0,
            entry_price: price,
            exit_conditions: vec![ExitCondition::Emergency],
            rationale: "test".into(),
            rationale_hash: TradeDecision::hash_rationale("test"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn rejects_none_side() {
        let mut slot = ExecutionSlot::new();
        let d = decision(Side::None, 50.0);
        assert!(slot.execute(&d, "m1", Utc::now()).is_err());
    }

    /// S6 — duplicate position on an occupied market is rejected.
    #[test]
    fn scenario_s6_duplicate_position_rejected() {
        let mut slot = ExecutionSlot::new();
        let d = decision(Side::Yes, 40.0);
        slot.execute(&d, "m1", Utc::now()).unwrap();
        slot.on_fill(&d, "m1", true, Utc::now()).unwrap();

        let d2 = decision(Side::Yes, 41.0);
        let err = slot.execute(&d2, "m1", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicatePosition(_)));
    }

    #[test]
    fn cancel_refused_once_filled() {
        let mut slot = ExecutionSlot::new();
        let d = decision(Side::Yes, 40.0);
        slot.execute(&d, "m1", Utc::now()).unwrap();
        slot.on_fill(&d, "m1", true, Utc::now()).unwrap();
        assert!(slot.cancel_order().is_err());
    }

    #[test]
    fn partial_fill_does_not_register_position() {
        let mut slot = ExecutionSlot::new();
        let d = decision(Side::Yes, 40.0);
        slot.execute(&d, "m1", Utc::now()).unwrap();
        let result = slot.on_fill(&d, "m1", false, Utc::now()).unwrap();
        assert!(result.is_none());
        assert!(!slot.has_open_position());
    }

    #[test]
    fn cancel_before_fill_clears_the_slot() {
        let mut slot = ExecutionSlot::new();
        let d = decision(Side::Yes, 40.0);
        slot.execute(&d, "m1", Utc::now()).unwrap();
        slot.cancel_order().unwrap();
        assert!(slot.current_order().is_none());
    }
}
