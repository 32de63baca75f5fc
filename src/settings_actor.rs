//! Settings actor (§9 "global mutable state" design note).
//!
//! Threshold tables are immutable snapshots taken at start. The *only*
//! in-band mutation is the auto-adjust rule in §4.4: when the Calibration
//! Monitor reports `range_coverage` below target, the Trade Decision
//! Engine's per-category `MIN_EDGE` is nudged up by 1 percentage point, up
//! to a ceiling of +5 over baseline. That single knob lives here, behind a
//! small serialized actor C4 reads at each evaluation, rather than as a
//! mutable field threaded through the engine itself.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::Category;

const MAX_EDGE_BUMP_PP: f64 = 5.0;

#[derive(Debug, Default)]
struct SettingsInner {
    edge_bump_pp: HashMap<String, f64>,
}

/// Cheap to clone-share (`Arc<SettingsActor>`); internally serialized by a
/// single `RwLock` since writes are rare (one per calibration report) and
/// reads happen once per trade evaluation.
#[derive(Debug, Default)]
pub struct SettingsActor {
    inner: RwLock<SettingsInner>,
}

impl SettingsActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current MIN_EDGE for `category`, baseline plus any accumulated bump.
    pub fn min_edge(&self, category: Category, baseline: f64) -> f64 {
        let inner = self.inner.read().expect("settings actor lock poisoned");
        let key = category_key(category);
        baseline + inner.edge_bump_pp.get(&key).copied().unwrap_or(0.0)
    }

    /// §4.4 auto-adjust: called when the Calibration Monitor reports
    /// `range_coverage < target - 0.05` for `category`. Bounded, monotone,
    /// deterministic - the only parameter change allowed in-band.
    pub fn record_coverage_shortfall(&self, category: Category) {
        let mut inner = self.inner.write().expect("settings actor lock poisoned");
        let key = category_key(category);
        let bump = inner.edge_bump_pp.entry(key).or_insert(0.0);
        *bump = (*bump + 1.0).min(MAX_EDGE_BUMP_PP);
    }

    /// Operator/test reset of all accumulated bumps.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("settings actor lock poisoned");
        inner.edge_bump_pp.clear();
    }
}

fn category_key(category: Category) -> String {
    format!("{category:?}").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_bounded_at_five() {
        let actor = SettingsActor::new();
        for _ in 0..10 {
            actor.record_coverage_shortfall(Category::Crypto);
        }
        assert_eq!(actor.min_edge(Category::Crypto, 15.0), 20.0);
    }

    #[test]
    fn categories_are_independent() {
        let actor = SettingsActor::new();
        actor.record_coverage_shortfall(Category::Crypto);
        assert_eq!(actor.min_edge(Category::Crypto, 15.0), 16.0);
        assert_eq!(actor.min_edge(Category::Politics, 12.0), 12.0);
    }
}
