//! Paper Trading Tracker (C6, spec §4.6).
//!
//! Owns every `PaperPosition` from fill to resolution, computes P&L on
//! resolution, persists the full ledger so a restart recovers open
//! positions exactly, and emits one `CalibrationRecord` per resolved
//! position to C7. Grounded on the teacher's `vault/paper_ledger.rs`
//! append-and-persist pattern, generalized to the YES/NO P&L formulas and
//! retention-window eviction this spec requires.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::{CalibrationRecord, Category, Outcome, PaperPosition, PositionStatus, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerLine {
    position: PaperPosition,
}

pub struct PaperTracker {
    store_path: PathBuf,
    positions: VecDeque<PaperPosition>,
    retention: usize,
}

impl PaperTracker {
    /// Loads the on-disk ledger if present, recovering every position
    /// exactly as it was written (§4.6: "a restart must recover every open
    /// position without loss or duplication").
    pub fn load(cfg: &Config) -> Result<Self, CoreError> {
        let store_path = PathBuf::from(&cfg.position_store_path);
        let mut positions = VecDeque::new();

        if store_path.exists() {
            let text = std::fs::read_to_string(&store_path).map_err(|e| {
                CoreError::PersistenceFailure(format!("reading {store_path:?}: {e}"))
            })?;
            for (lineno, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: LedgerLine = serde_json::from_str(line).map_err(|e| {
                    CoreError::PersistenceFailure(format!(
                        "malformed ledger line {lineno} in {store_path:?}: {e}"
                    ))
                })?;
                positions.push_back(parsed.position);
            }
            info!(count = positions.len(), "recovered paper ledger");
        }

        Ok(Self {
            store_path,
            positions,
            retention: cfg.max_open_positions.max(cfg.calibration_window),
        })
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &PaperPosition> {
        self.positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
    }

    pub fn open_count(&self) -> usize {
        self.open_positions().count()
    }

    /// Register a freshly filled position (from C5) into the ledger and
    /// persist immediately so a crash between fill and the next tick can't
    /// lose it.
    pub fn register(&mut self, position: PaperPosition) -> Result<(), CoreError> {
        self.positions.push_back(position);
        self.persist()
    }

    /// Resolve an open position against the market's realized outcome,
    /// compute P&L, persist, and return a `CalibrationRecord` for C7.
    ///
    /// §4.6: `exit_price = 100 if winning side == actual else 0` - the
    /// settled probability, not the last-observed market price. P&L: YES
    /// `(exit_price - entry_price) * size_usd / 100`, NO
    /// `(entry_price - exit_price) * size_usd / 100`.
    pub fn resolve(
        &mut self,
        position_id: &str,
        actual_outcome: Outcome,
        category: Category,
        invalidation_triggered: bool,
        now: DateTime<Utc>,
    ) -> Result<CalibrationRecord, CoreError> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| {
                CoreError::PersistenceFailure(format!("no open position {position_id}"))
            })?;

        if position.side == Side::None {
            return Err(CoreError::InvariantViolation(
                "position with Side::None cannot resolve".into(),
            ));
        }

        let won = matches!(
            (position.side, actual_outcome),
            (Side::Yes, Outcome::Yes) | (Side::No, Outcome::No)
        );
        let exit_price = if won { 100.0 } else { 0.0 };
        let pnl = match position.side {
            Side::Yes => (exit_price - position.entry_price) * position.size_usd / 100.0,
            Side::No => (position.entry_price - exit_price) * position.size_usd / 100.0,
            Side::None => unreachable!(),
        };

        position.status = if won {
            PositionStatus::Win
        } else {
            PositionStatus::Loss
        };
        position.exit_price = Some(exit_price);
        position.resolved_ts = Some(now);
        position.pnl = Some(pnl);
        position.actual_outcome = Some(actual_outcome);

        let record = CalibrationRecord {
            market_id: position.market_id.clone(),
            category,
            belief_at_entry: (position.belief_low, position.belief_high),
            confidence_at_entry: position.confidence_at_entry,
            unknowns_count: position.unknowns_count,
            actual_outcome,
            side: position.side,
            resolved_ts: now,
            edge_at_entry: position.edge_at_entry,
            invalidation_triggered,
        };

        self.persist()?;
        self.evict_beyond_retention();
        Ok(record)
    }

    /// Expire a position whose market closed without resolving in time
    /// (§4.6 `EXPIRED`).
    pub fn expire(&mut self, position_id: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| {
                CoreError::PersistenceFailure(format!("no open position {position_id}"))
            })?;
        position.status = PositionStatus::Expired;
        position.resolved_ts = Some(now);
        position.pnl = None;
        self.persist()?;
        self.evict_beyond_retention();
        Ok(())
    }

    fn evict_beyond_retention(&mut self) {
        let resolved_count = self
            .positions
            .iter()
            .filter(|p| p.status != PositionStatus::Open)
            .count();
        if resolved_count > self.retention {
            let mut to_drop = resolved_count - self.retention;
            while to_drop > 0 {
                if let Some(idx) = self
                    .positions
                    .iter()
                    .position(|p| p.status != PositionStatus::Open)
                {
                    self.positions.remove(idx);
                    to_drop -= 1;
                } else {
                    break;
                }
            }
        }
    }

    fn persist(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::PersistenceFailure(format!("creating {parent:?}: {e}"))
                })?;
            }
        }

        let mut buf = String::new();
        for position in &self.positions {
            let line = LedgerLine {
                position: position.clone(),
            };
            let json = serde_json::to_string(&line).map_err(|e| {
                CoreError::PersistenceFailure(format!("serializing ledger line: {e}"))
            })?;
            buf.push_str(&json);
            buf.push('\n');
        }

        std::fs::write(&self.store_path, buf).map_err(|e| {
            CoreError::PersistenceFailure(format!("writing {:?}: {e}", self.store_path))
        })?;
        Ok(())
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn position(side: Side, entry: f64, size: f64) -> PaperPosition {
        PaperPosition {
            id: "p1".to_string(),
            market_id: "m1".to_string(),
            side,
            entry_price: entry,
            belief_low: 65.0,
            belief_high: 80.0,
            edge_at_entry: 13.0,
            confidence_at_entry: 78.0,
            unknowns_count: 1,
            size_usd: size,
            entry_ts: Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            resolved_ts: None,
            pnl: None,
            actual_outcome: None,
        }
    }

    fn tracker_with_path(path: PathBuf) -> PaperTracker {
        let cfg = Config {
            position_store_path: path.to_string_lossy().to_string(),
            ..Config::default()
        };
        PaperTracker::load(&cfg).unwrap()
    }

    /// S7 — YES win pays out +55 (entry=45, exit_price=100 on resolution).
    #[test]
    fn scenario_s7_resolution_pnl_yes() {
        let dir = tempdir().unwrap();
        let mut tracker = tracker_with_path(dir.path().join("ledger.jsonl"));
        tracker.register(position(Side::Yes, 45.0, 100.0)).unwrap();

        let record = tracker
            .resolve("p1", Outcome::Yes, Category::Crypto, false, Utc::now())
            .unwrap();

        let resolved = tracker.positions.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(resolved.exit_price, Some(100.0));
        assert_eq!(resolved.pnl, Some(55.0));
        assert_eq!(resolved.status, PositionStatus::Win);
        assert_eq!(record.actual_outcome, Outcome::Yes);
    }

    /// S7 — matching NO-side position loses -55 (entry=45, exit_price=0).
    #[test]
    fn scenario_s7_resolution_pnl_no() {
        let dir = tempdir().unwrap();
        let mut tracker = tracker_with_path(dir.path().join("ledger.jsonl"));
        tracker.register(position(Side::No, 45.0, 100.0)).unwrap();

        tracker
            .resolve("p1", Outcome::Yes, Category::Crypto, false, Utc::now())
            .unwrap();

        let resolved = tracker.positions.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(resolved.exit_price, Some(0.0));
        assert_eq!(resolved.pnl, Some(-55.0));
        assert_eq!(resolved.status, PositionStatus::Loss);
    }

    #[test]
    fn losing_trade_has_negative_pnl() {
        let dir = tempdir().unwrap();
        let mut tracker = tracker_with_path(dir.path().join("ledger.jsonl"));
        tracker.register(position(Side::Yes, 40.0, 100.0)).unwrap();

        tracker
            .resolve("p1", Outcome::No, Category::Crypto, false, Utc::now())
            .unwrap();

        let resolved = tracker.positions.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(resolved.exit_price, Some(0.0));
        assert_eq!(resolved.pnl, Some(-40.0));
        assert_eq!(resolved.status, PositionStatus::Loss);
    }

    #[test]
    fn restart_recovers_open_positions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let mut tracker = tracker_with_path(path.clone());
            tracker.register(position(Side::Yes, 40.0, 100.0)).unwrap();
        }
        let reloaded = tracker_with_path(path);
        assert_eq!(reloaded.open_count(), 1);
    }

    #[test]
    fn expire_leaves_pnl_undefined_and_clears_open_status() {
        let dir = tempdir().unwrap();
        let mut tracker = tracker_with_path(dir.path().join("ledger.jsonl"));
        tracker.register(position(Side::Yes, 40.0, 100.0)).unwrap();
        tracker.expire("p1", Utc::now()).unwrap();
        assert_eq!(tracker.open_count(), 0);
        let expired = tracker.positions.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(expired.status, PositionStatus::Expired);
        assert_eq!(expired.pnl, None);
    }
}
