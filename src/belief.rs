//! Belief Engine (C2, spec §4.2).
//!
//! Deterministic signal classification → range update with per-class
//! impact caps, conflict widening, an unknowns ledger, and a multi-factor
//! confidence score with time decay. Every public function here is a pure
//! transformation of a `BeliefState` - no I/O, no clock reads beyond the
//! `now`/`as_of` argument the caller supplies (suspension-point discipline,
//! spec §5: "C2/C4/C7 pure logic never suspends").

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::{round2, BeliefState, Direction, Signal, SignalClass, Unknown};

/// Minimum width the belief range is allowed to collapse to (I3). Two
/// decimal places is the storage resolution (§9), so anything tighter is
/// indistinguishable from a point estimate at the boundary.
pub const MIN_WIDTH_EPSILON: f64 = 0.01;

#[derive(Debug, Clone)]
pub enum BeliefUpdateOutcome {
    Applied(BeliefState),
    Rejected { reason: &'static str },
}

/// Apply one signal to a belief, producing a new state or a rejection.
/// Never mutates `old`; never errors - GI5 ineligibility is a `Rejected`
/// variant (§7: `SignalIneligible` returns C3 to `OBSERVE`, no HALT), while
/// a genuine GI2 breach is the one path that returns `Err` so the caller
/// can force HALT.
pub fn apply_signal(
    old: &BeliefState,
    signal: Signal,
    now: DateTime<Utc>,
    cfg: &Config,
) -> Result<BeliefUpdateOutcome, CoreError> {
    if signal.class == SignalClass::Speculative && !has_non_speculative_basis(old, cfg) {
        return Ok(BeliefUpdateOutcome::Rejected {
            reason: "speculative signal without non-speculative basis in recent history (GI5)",
        });
    }

    let w = old.width();
    let cap = signal.class.impact_cap();
    let max_shift = cap * 100.0 * (signal.strength.get() as f64 / 5.0);
    let shift = max_shift.min(w * 0.6);
    let dir = signal.direction.sign();

    let mut low = old.belief_low + dir * shift;
    let mut high = old.belief_high + dir * shift;

    if signal.conflicts_with_existing {
        match signal.direction {
            Direction::Down => low -= w * 0.25,
            Direction::Up => high += w * 0.25,
            Direction::Neutral => {}
        }
    }

    low = low.clamp(0.0, 100.0);
    high = high.clamp(0.0, 100.0);
    if low > high {
        std::mem::swap(&mut low, &mut high);
    }
    if high - low < MIN_WIDTH_EPSILON {
        let pad = MIN_WIDTH_EPSILON / 2.0;
        low = (low - pad).max(0.0);
        high = (high + pad).min(100.0);
    }

    let days_since_previous = old
        .last_signal
        .as_ref()
        .map(|prev| (signal.timestamp - prev.timestamp).num_seconds() as f64 / 86_400.0)
        .unwrap_or(0.0);

    let mut history = old.signal_history.clone();
    history.push(signal.clone());
    if history.len() > cfg.max_signal_history {
        history.remove(0);
    }

    let active_unknowns = active_unknown_count(&old.unknowns);
    let new_confidence = recompute_confidence(&history, active_unknowns, days_since_previous);

    if active_unknowns > active_unknown_count(&old.unknowns) && new_confidence > old.confidence {
        // Unreachable given apply_signal never changes the unknowns set,
        // but kept as an explicit GI2 guard so the check exists in code,
        // not only in the formula's arithmetic.
        return Err(CoreError::InvariantViolation(
            "GI2: confidence rose while unknown count rose".to_string(),
        ));
    }

    let new_state = BeliefState {
        belief_low: round2(low),
        belief_high: round2(high),
        confidence: round2(new_confidence),
        unknowns: old.unknowns.clone(),
        signal_history: history,
        last_updated: now,
        last_signal: Some(signal),
    };

    Ok(BeliefUpdateOutcome::Applied(new_state))
}

/// Recompute confidence purely from elapsed time, with no new signal -
/// the periodic-decay path used by the orchestrator between ticks and by
/// scenario S3.
pub fn decay_confidence(state: &BeliefState, now: DateTime<Utc>) -> BeliefState {
    let active_unknowns = active_unknown_count(&state.unknowns);
    let days_since = state
        .last_signal
        .as_ref()
        .map(|s| (now - s.timestamp).num_seconds() as f64 / 86_400.0)
        .unwrap_or(0.0);
    let confidence = recompute_confidence(&state.signal_history, active_unknowns, days_since);

    let mut next = state.clone();
    next.confidence = round2(confidence);
    next.last_updated = now;
    next
}

/// Register a new unknown. Confidence can only fall or hold as a result
/// (I2/GI2): adding an unresolved unknown always subtracts from the score,
/// so the post-condition is checked rather than assumed.
pub fn add_unknown(
    state: &BeliefState,
    description: impl Into<String>,
    now: DateTime<Utc>,
    cfg: &Config,
) -> Result<BeliefState, CoreError> {
    let before = active_unknown_count(&state.unknowns);

    let mut unknowns = state.unknowns.clone();
    unknowns.push(Unknown {
        id: Uuid::new_v4().to_string(),
        description: description.into(),
        added_at: now,
        resolved_at: None,
    });
    if unknowns.len() > cfg.max_unknowns {
        unknowns.remove(0);
    }

    let after = active_unknown_count(&unknowns);
    let days_since = state
        .last_signal
        .as_ref()
        .map(|s| (now - s.timestamp).num_seconds() as f64 / 86_400.0)
        .unwrap_or(0.0);
    let new_confidence = recompute_confidence(&state.signal_history, after, days_since);

    if after > before && new_confidence > state.confidence {
        return Err(CoreError::InvariantViolation(
            "GI2: confidence rose while unknown count rose".to_string(),
        ));
    }

    let mut next = state.clone();
    next.unknowns = unknowns;
    next.confidence = round2(new_confidence);
    next.last_updated = now;
    Ok(next)
}

/// Mark an unknown resolved. This may *raise* confidence (GI2 only
/// constrains increases in unknown count, never decreases).
pub fn resolve_unknown(state: &BeliefState, id: &str, now: DateTime<Utc>) -> BeliefState {
    let mut unknowns = state.unknowns.clone();
    for u in unknowns.iter_mut() {
        if u.id == id {
            u.resolved_at = Some(now);
        }
    }
    let active = active_unknown_count(&unknowns);
    let days_since = state
        .last_signal
        .as_ref()
        .map(|s| (now - s.timestamp).num_seconds() as f64 / 86_400.0)
        .unwrap_or(0.0);
    let confidence = recompute_confidence(&state.signal_history, active, days_since);

    let mut next = state.clone();
    next.unknowns = unknowns;
    next.confidence = round2(confidence);
    next.last_updated = now;
    next
}

fn active_unknown_count(unknowns: &[Unknown]) -> usize {
    unknowns.iter().filter(|u| u.resolved_at.is_none()).count()
}

fn has_non_speculative_basis(state: &BeliefState, cfg: &Config) -> bool {
    state
        .signal_history
        .iter()
        .rev()
        .take(cfg.speculative_lookback)
        .any(|s| s.class != SignalClass::Speculative)
}

/// Confidence formula shared by `apply_signal`, `decay_confidence`,
/// `add_unknown`, and `resolve_unknown` (spec §4.2).
fn recompute_confidence(history: &[Signal], active_unknowns: usize, days_since: f64) -> f64 {
    let authoritative = history
        .iter()
        .filter(|s| s.class == SignalClass::Authoritative)
        .count();
    let procedural = history
        .iter()
        .filter(|s| s.class == SignalClass::Procedural)
        .count();
    let any_conflict = history.iter().any(|s| s.conflicts_with_existing);

    let c = 50.0
        + 10.0 * authoritative as f64
        + 5.0 * procedural as f64
        - 7.0 * active_unknowns as f64
        - if any_conflict { 10.0 } else { 0.0 }
        - 0.5 * days_since.max(0.0);

    c.clamp(30.0, 95.0)
}
