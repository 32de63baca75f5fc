//! Memory pressure policy (spec §5).
//!
//! Grounded on the teacher's `performance/memory.rs`: a process-wide
//! `sysinfo::System` cached behind a lazily-initialized mutex (refreshing
//! a full system snapshot on every call is wasteful), sampled for RSS and
//! compared against two thresholds. The actions taken here are
//! externalized policy, not algorithmic changes to the Belief Engine or
//! Trade Decision Engine themselves (§5: "memory pressure sheds load, it
//! never reinterprets a belief").

use parking_lot::Mutex;
use std::sync::OnceLock;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

use crate::config::Config;

fn system_cache() -> &'static Mutex<System> {
    static CACHE: OnceLock<Mutex<System>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(System::new()))
}

/// Resident set size of the current process, in megabytes.
pub fn current_rss_mb() -> u64 {
    let mut system = system_cache().lock();
    let pid = Pid::from_u32(std::process::id());
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        ProcessRefreshKind::new().with_memory(),
    );
    system
        .process(pid)
        .map(|p| p.memory() / (1024 * 1024))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Critical,
    Emergency,
}

pub fn classify(rss_mb: u64, cfg: &Config) -> MemoryPressure {
    if rss_mb >= cfg.mem_emergency_mb {
        MemoryPressure::Emergency
    } else if rss_mb >= cfg.mem_critical_mb {
        MemoryPressure::Critical
    } else {
        MemoryPressure::Normal
    }
}

/// A single shedding action the orchestrator applies at `Critical` or
/// `Emergency` pressure. Ordered cheapest/least-destructive first so the
/// caller can stop as soon as pressure clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShedAction {
    ShrinkSignalHistory,
    DropLowestLiquidityMarkets,
    ClearOldResolvedPositions,
}

/// The ordered policy for a given pressure level. `Normal` sheds nothing;
/// `Critical` trims history and stale resolved positions; `Emergency`
/// additionally drops the lowest-liquidity markets outright, shrinking the
/// number of per-market tasks the orchestrator has to carry.
pub fn shed_plan(pressure: MemoryPressure) -> &'static [ShedAction] {
    match pressure {
        MemoryPressure::Normal => &[],
        MemoryPressure::Critical => &[
            ShedAction::ShrinkSignalHistory,
            ShedAction::ClearOldResolvedPositions,
        ],
        MemoryPressure::Emergency => &[
            ShedAction::ShrinkSignalHistory,
            ShedAction::ClearOldResolvedPositions,
            ShedAction::DropLowestLiquidityMarkets,
        ],
    }
}

/// Log-only hook invoked once per tick from the orchestrator; kept
/// separate from `classify`/`shed_plan` so tests exercise the pure policy
/// without needing a real process RSS reading.
pub fn report_pressure(rss_mb: u64, cfg: &Config) -> MemoryPressure {
    let pressure = classify(rss_mb, cfg);
    match pressure {
        MemoryPressure::Critical => warn!(rss_mb, "memory pressure critical, shedding load"),
        MemoryPressure::Emergency => {
            warn!(rss_mb, "memory pressure emergency, aggressive shedding")
        }
        MemoryPressure::Normal => {}
    }
    pressure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_critical_is_normal() {
        let cfg = Config::default();
        assert_eq!(classify(50, &cfg), MemoryPressure::Normal);
    }

    #[test]
    fn at_critical_threshold_is_critical() {
        let cfg = Config::default();
        assert_eq!(classify(cfg.mem_critical_mb, &cfg), MemoryPressure::Critical);
    }

    #[test]
    fn at_emergency_threshold_is_emergency() {
        let cfg = Config::default();
        assert_eq!(
            classify(cfg.mem_emergency_mb, &cfg),
            MemoryPressure::Emergency
        );
    }

    #[test]
    fn emergency_plan_includes_dropping_markets() {
        let plan = shed_plan(MemoryPressure::Emergency);
        assert!(plan.contains(&ShedAction::DropLowestLiquidityMarkets));
    }

    #[test]
    fn normal_plan_sheds_nothing() {
        assert!(shed_plan(MemoryPressure::Normal).is_empty());
    }
}
