//! Calibration & Halt Monitor (C7, spec §4.7).
//!
//! A bounded, append-only window of `CalibrationRecord`s from C6, reduced
//! to four metrics on demand, and four halt conditions - each implementing
//! the literal trigger rule spec §4.7 names, not a restatement of it.
//! Grounded on the teacher's `risk.rs` gate pattern (`RiskCheckResult::pass`/
//! `fail`) generalized from a single-order pre-trade check to a rolling
//! population-level judgment.

use std::collections::VecDeque;

use crate::models::{CalibrationRecord, Category, Outcome, Side};
use crate::settings_actor::SettingsActor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationMetrics {
    /// Fraction of resolved markets whose actual outcome fell within
    /// `[belief_low, belief_high]` at entry (§4.7), measured as
    /// YES-probability containment: outcome=YES counted as covered if
    /// `belief_high >= 50`, outcome=NO covered if `belief_low <= 50`.
    /// Target: `range_coverage_target`.
    pub range_coverage: f64,
    /// Mean absolute deviation between each confidence-decile bucket's
    /// realized win rate and that bucket's midpoint, averaged over buckets
    /// holding at least one record (§4.7: "partition records by confidence
    /// deciles; for each bucket compute win rate; compare to bucket
    /// midpoint"). Lower is better calibrated; 0 is perfect.
    pub bucket_accuracy: f64,
    /// Mean realized edge / mean predicted edge (§4.7). Predicted edge is
    /// `edge_at_entry`; realized edge is `edge_at_entry` signed by whether
    /// the position won (+) or lost (-).
    pub edge_effectiveness: f64,
    /// Mean `unknowns_count` across the window - rising density is an
    /// early warning the belief engine is trading through unresolved
    /// uncertainty rather than around it.
    pub unknown_density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCondition {
    /// HC1: `range_coverage` deviates from `range_coverage_target` by more
    /// than `range_coverage_tolerance_pp` (default 15) percentage points,
    /// over a rolling window of at least `range_coverage_min_records`
    /// (default 20) records.
    CoverageDeviation,
    /// HC2: a `>=85` confidence bucket shows a lower win rate than a
    /// `<=60` confidence bucket, both holding at least `bucket_min_records`
    /// (default 10) records.
    ConfidenceBucketInversion,
    /// HC3: three consecutive belief invalidations on the same category.
    ConsecutiveInvalidations,
    /// HC4: mean unknown density strictly increases across three
    /// consecutive, equal-size windows of the most recent records.
    UnknownDensityRising,
}

pub struct CalibrationMonitor {
    window: VecDeque<CalibrationRecord>,
    capacity: usize,
    range_coverage_target: f64,
    range_coverage_tolerance_pp: f64,
    range_coverage_min_records: usize,
    bucket_min_records: usize,
    unknown_density_window: usize,
    last_invalidation_category: Option<Category>,
    invalidation_streak: u32,
}

impl CalibrationMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capacity: usize,
        range_coverage_target: f64,
        range_coverage_tolerance_pp: f64,
        range_coverage_min_records: usize,
        bucket_min_records: usize,
        unknown_density_window: usize,
    ) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            range_coverage_target,
            range_coverage_tolerance_pp,
            range_coverage_min_records,
            bucket_min_records,
            unknown_density_window,
            last_invalidation_category: None,
            invalidation_streak: 0,
        }
    }

    /// Record a resolution and return any halt condition it triggers.
    /// Also reports category coverage shortfalls to the settings actor
    /// (§4.4 auto-adjust) independent of whether a halt fires.
    pub fn record(
        &mut self,
        record: CalibrationRecord,
        settings: &SettingsActor,
    ) -> Option<HaltCondition> {
        // HC3 bookkeeping: a streak survives only across consecutive
        // invalidation-exit records that share the same category; any
        // non-invalidation record or a category change resets it.
        if record.invalidation_triggered {
            if self.last_invalidation_category == Some(record.category) {
                self.invalidation_streak += 1;
            } else {
                self.invalidation_streak = 1;
                self.last_invalidation_category = Some(record.category);
            }
        } else {
            self.invalidation_streak = 0;
            self.last_invalidation_category = None;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(record.clone());

        if self.invalidation_streak >= 3 {
            return Some(HaltCondition::ConsecutiveInvalidations);
        }

        let metrics = self.metrics();

        // §4.4 auto-adjust: coverage falling more than 5pp below target
        // nudges the category's MIN_EDGE up, independent of whether HC1
        // itself fires (HC1 only trips past range_coverage_tolerance_pp).
        let shortfall_pp = (self.range_coverage_target - metrics.range_coverage) * 100.0;
        if shortfall_pp > 5.0 {
            settings.record_coverage_shortfall(record.category);
        }

        if self.window.len() >= self.range_coverage_min_records
            && shortfall_pp.abs() > self.range_coverage_tolerance_pp
        {
            return Some(HaltCondition::CoverageDeviation);
        }

        if self.confidence_bucket_inversion() {
            return Some(HaltCondition::ConfidenceBucketInversion);
        }

        if self.unknown_density_rising() {
            return Some(HaltCondition::UnknownDensityRising);
        }

        None
    }

    /// HC2: compare win rate between the `>=85` and `<=60` confidence
    /// buckets, only once both hold `bucket_min_records` or more.
    fn confidence_bucket_inversion(&self) -> bool {
        let high: Vec<&CalibrationRecord> = self
            .window
            .iter()
            .filter(|r| r.confidence_at_entry >= 85.0)
            .collect();
        let low: Vec<&CalibrationRecord> = self
            .window
            .iter()
            .filter(|r| r.confidence_at_entry <= 60.0)
            .collect();
        if high.len() < self.bucket_min_records || low.len() < self.bucket_min_records {
            return false;
        }
        win_rate(&high) < win_rate(&low)
    }

    /// HC4: split the most recent `3 * unknown_density_window` records
    /// into three equal-size, time-ordered windows and check the mean
    /// `unknowns_count` strictly increases window over window.
    fn unknown_density_rising(&self) -> bool {
        let w = self.unknown_density_window;
        if w == 0 || self.window.len() < w * 3 {
            return false;
        }
        let records: Vec<&CalibrationRecord> = self.window.iter().collect();
        let n = records.len();
        let mean = |slice: &[&CalibrationRecord]| -> f64 {
            slice.iter().map(|r| r.unknowns_count as f64).sum::<f64>() / slice.len() as f64
        };
        let d1 = mean(&records[n - 3 * w..n - 2 * w]);
        let d2 = mean(&records[n - 2 * w..n - w]);
        let d3 = mean(&records[n - w..n]);
        d1 < d2 && d2 < d3
    }

    pub fn metrics(&self) -> CalibrationMetrics {
        if self.window.is_empty() {
            return CalibrationMetrics {
                range_coverage: 1.0,
                bucket_accuracy: 0.0,
                edge_effectiveness: 0.0,
                unknown_density: 0.0,
            };
        }

        let n = self.window.len() as f64;

        let covered = self
            .window
            .iter()
            .filter(|r| match r.actual_outcome {
                Outcome::Yes => r.belief_at_entry.1 >= 50.0,
                Outcome::No => r.belief_at_entry.0 <= 50.0,
            })
            .count() as f64;
        let range_coverage = covered / n;

        let bucket_accuracy = confidence_decile_calibration_error(&self.window);

        let mean_predicted_edge = self.window.iter().map(|r| r.edge_at_entry).sum::<f64>() / n;
        let mean_realized_edge = self
            .window
            .iter()
            .map(|r| {
                if won_by_record(r) {
                    r.edge_at_entry
                } else {
                    -r.edge_at_entry
                }
            })
            .sum::<f64>()
            / n;
        let edge_effectiveness = if mean_predicted_edge.abs() > f64::EPSILON {
            mean_realized_edge / mean_predicted_edge
        } else {
            0.0
        };

        let unknown_density = self.window.iter().map(|r| r.unknowns_count as f64).sum::<f64>() / n;

        CalibrationMetrics {
            range_coverage,
            bucket_accuracy,
            edge_effectiveness,
            unknown_density,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

fn won_by_record(r: &CalibrationRecord) -> bool {
    matches!(
        (r.side, r.actual_outcome),
        (Side::Yes, Outcome::Yes) | (Side::No, Outcome::No)
    )
}

fn win_rate(records: &[&CalibrationRecord]) -> f64 {
    let wins = records.iter().filter(|r| won_by_record(r)).count() as f64;
    wins / records.len() as f64
}

/// §4.7 `bucket_accuracy`: partition the window into confidence deciles
/// (`[30,40) .. [90,95]`, per the §3 confidence range), compute each
/// populated bucket's win rate, and average the absolute distance from its
/// midpoint across populated buckets.
fn confidence_decile_calibration_error(window: &VecDeque<CalibrationRecord>) -> f64 {
    const DECILES: [(f64, f64); 7] = [
        (30.0, 40.0),
        (40.0, 50.0),
        (50.0, 60.0),
        (60.0, 70.0),
        (70.0, 80.0),
        (80.0, 90.0),
        (90.0, 95.0),
    ];

    let mut total = 0.0;
    let mut populated = 0;
    for (lo, hi) in DECILES {
        let bucket: Vec<&CalibrationRecord> = window
            .iter()
            .filter(|r| r.confidence_at_entry >= lo && r.confidence_at_entry < hi + f64::EPSILON)
            .collect();
        if bucket.is_empty() {
            continue;
        }
        let midpoint = (lo + hi) / 2.0 / 100.0;
        let rate = win_rate(&bucket);
        total += (rate - midpoint).abs();
        populated += 1;
    }
    if populated == 0 {
        0.0
    } else {
        total / populated as f64
    }
}
