//! System State Machine (C3, spec §4.3).
//!
//! Seven states, a fixed legal transition table, and an emergency HALT
//! that, once entered, is terminal without operator reset. One instance
//! per market (§5: "the State Machine is per-market; there is no global
//! state machine").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Observe,
    IngestSignal,
    UpdateBelief,
    EvaluateTrade,
    ExecuteTrade,
    Monitor,
    Halt,
}

impl State {
    fn allowed_targets(self) -> &'static [State] {
        match self {
            State::Observe => &[State::IngestSignal, State::Halt],
            State::IngestSignal => &[State::UpdateBelief, State::Observe, State::Halt],
            State::UpdateBelief => &[State::EvaluateTrade, State::Observe, State::Halt],
            State::EvaluateTrade => &[State::ExecuteTrade, State::Observe, State::Halt],
            State::ExecuteTrade => &[State::Monitor, State::Halt],
            State::Monitor => &[State::Observe, State::Halt],
            State::Halt => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub to: State,
    pub reason: String,
}

/// Per-market state machine. `halt_cause` is `Some` only once HALT has been
/// entered and records why, for the audit trail (§7: "HALT produces a
/// single audit+notification record carrying the enum and the rendered
/// reason").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStateMachine {
    pub market_id: String,
    pub state: State,
    pub halt_cause: Option<String>,
    #[serde(skip)]
    history: Vec<TransitionRecord>,
}

impl MarketStateMachine {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            state: State::Observe,
            halt_cause: None,
            history: Vec::new(),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.state == State::Halt
    }

    /// Attempt a transition. An illegal transition forces HALT (with
    /// reason "illegal transition") instead of returning an error to the
    /// caller - per spec, illegal transitions are not recoverable, they
    /// quiesce the market immediately.
    pub fn transition(&mut self, to: State, reason: impl Into<String>) {
        let reason = reason.into();
        if self.state == State::Halt {
            // HALT is terminal; nothing to do, not even record another
            // transition attempt as legal.
            return;
        }

        if self.state.allowed_targets().contains(&to) {
            self.history.push(TransitionRecord {
                from: self.state,
                to,
                reason,
            });
            self.state = to;
        } else {
            let illegal_reason = format!(
                "illegal transition: {:?} -> {:?} (attempted reason: {reason})",
                self.state, to
            );
            self.history.push(TransitionRecord {
                from: self.state,
                to: State::Halt,
                reason: illegal_reason.clone(),
            });
            self.state = State::Halt;
            self.halt_cause = Some(illegal_reason);
        }
    }

    /// Unconditional jump to HALT from any non-terminal state (§4.3
    /// `forceHalt`), invoked by any invariant violation or by C7.
    pub fn force_halt(&mut self, reason: impl Into<String>) {
        if self.state == State::Halt {
            return;
        }
        let reason = reason.into();
        self.history.push(TransitionRecord {
            from: self.state,
            to: State::Halt,
            reason: reason.clone(),
        });
        self.state = State::Halt;
        self.halt_cause = Some(reason);
    }

    /// Post-HALT operator action only (§6 control surface `reset()`).
    /// Resetting does not erase the audit history, only unblocks further
    /// transitions.
    pub fn reset(&mut self) {
        if self.state != State::Halt {
            return;
        }
        self.state = State::Observe;
        self.halt_cause = None;
        self.history.push(TransitionRecord {
            from: State::Halt,
            to: State::Observe,
            reason: "operator reset".to_string(),
        });
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_path_through_one_tick() {
        let mut m = MarketStateMachine::new("m1");
        m.transition(State::IngestSignal, "signal arrived");
        m.transition(State::UpdateBelief, "signal eligible");
        m.transition(State::EvaluateTrade, "belief updated");
        m.transition(State::ExecuteTrade, "trade eligible");
        m.transition(State::Monitor, "order filled");
        m.transition(State::Observe, "monitor complete");
        assert_eq!(m.state, State::Observe);
        assert!(!m.is_halted());
    }

    #[test]
    fn illegal_transition_forces_halt() {
        let mut m = MarketStateMachine::new("m1");
        // OBSERVE -> EXECUTE_TRADE is not in the legal table.
        m.transition(State::ExecuteTrade, "skip ahead");
        assert!(m.is_halted());
        assert!(m.halt_cause.as_ref().unwrap().contains("illegal transition"));
    }

    #[test]
    fn halt_is_terminal_without_reset() {
        let mut m = MarketStateMachine::new("m1");
        m.force_halt("calibration failure");
        m.transition(State::Observe, "try to resume");
        assert!(m.is_halted());
    }

    #[test]
    fn reset_returns_to_observe() {
        let mut m = MarketStateMachine::new("m1");
        m.force_halt("calibration failure");
        m.reset();
        assert_eq!(m.state, State::Observe);
        assert!(m.halt_cause.is_none());
    }

    #[test]
    fn rejection_path_returns_to_observe() {
        let mut m = MarketStateMachine::new("m1");
        m.transition(State::IngestSignal, "signal arrived");
        m.transition(State::Observe, "signal ineligible");
        assert_eq!(m.state, State::Observe);
        assert!(!m.is_halted());
    }
}
