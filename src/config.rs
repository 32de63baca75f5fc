//! Configuration (spec §6, §9 "global mutable state").
//!
//! Loaded once at startup into an immutable snapshot, the way the teacher's
//! `models::Config::from_env` works, extended with an optional TOML file
//! layer (`toml` is already part of the dependency stack) so the larger
//! option surface in §6 doesn't have to be stuffed into two dozen env vars.
//! The *only* in-band mutation after startup is the auto-adjust rule in
//! §4.4, which lives in `settings_actor.rs`, not here.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_markets: usize,
    pub min_liquidity_usd: f64,
    pub max_signal_history: usize,
    pub max_unknowns: usize,
    pub poll_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    pub mem_critical_mb: u64,
    pub mem_emergency_mb: u64,

    pub min_confidence: f64,
    pub max_width: f64,
    /// Per-category MIN_EDGE override. Falls back to `Category::min_edge_baseline`
    /// for any category not present here.
    pub min_edge_overrides: HashMap<String, f64>,

    pub max_position_size_usd: f64,
    pub daily_loss_limit_usd: f64,
    pub max_open_positions: usize,

    pub virtual_capital_usd: f64,
    pub resolution_check_ms: u64,

    pub kelly_fraction: f64,
    pub max_position_pct: f64,
    pub min_position_usd: f64,

    pub position_store_path: String,
    pub notification_rate_per_min: u32,
    pub connector_timeout_ms: u64,
    pub min_rss_fetch_interval_s: u64,

    /// GI5 lookback: a speculative signal needs a non-speculative entry in
    /// the last N history entries to be eligible at all (§4.2 default 10).
    pub speculative_lookback: usize,

    /// Calibration window size and halt-trigger thresholds (§4.7).
    pub calibration_window: usize,
    pub range_coverage_target: f64,
    pub range_coverage_tolerance_pp: f64,
    /// HC1's required minimum population before a coverage deviation can
    /// halt (§4.7: "over a rolling window of at least 20 records").
    pub range_coverage_min_records: usize,
    pub bucket_min_records: usize,
    /// HC4 window-chunk size: the most recent `3 * unknown_density_window`
    /// records split into three equal consecutive windows. Spec §4.7 names
    /// "three consecutive equal-size windows" but leaves the window size
    /// itself a tunable; see DESIGN.md for the chosen default.
    pub unknown_density_window: usize,

    /// Retry budget for `PersistenceFailure` before `forceHalt` (§7).
    pub persistence_retry_attempts: u32,
    pub persistence_retry_backoff_ms: u64,

    pub audit_log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_markets: 300,
            min_liquidity_usd: 10_000.0,
            max_signal_history: 15,
            max_unknowns: 3,
            poll_interval_ms: 60_000,
            cleanup_interval_ms: 60_000,
            mem_critical_mb: 120,
            mem_emergency_mb: 140,

            min_confidence: 65.0,
            max_width: 25.0,
            min_edge_overrides: HashMap::new(),

            max_position_size_usd: 100.0,
            daily_loss_limit_usd: 50.0,
            max_open_positions: 5,

            virtual_capital_usd: 10_000.0,
            resolution_check_ms: 300_000,

            kelly_fraction: 0.25,
            max_position_pct: 0.10,
            min_position_usd: 1.0,
            speculative_lookback: 10,

            position_store_path: "./data/paper_positions.jsonl".to_string(),
            notification_rate_per_min: 10,
            connector_timeout_ms: 10_000,
            min_rss_fetch_interval_s: 300,

            calibration_window: 200,
            range_coverage_target: 0.90,
            range_coverage_tolerance_pp: 15.0,
            range_coverage_min_records: 20,
            bucket_min_records: 10,
            unknown_density_window: 5,

            persistence_retry_attempts: 3,
            persistence_retry_backoff_ms: 100,

            audit_log_path: "./data/audit.jsonl".to_string(),
        }
    }
}

impl Config {
    /// `MIN_LIQUIDITY` gate input for §4.4's gate 3. Category-specific
    /// overrides are not required by spec but the field is already a map,
    /// so the knob exists if a deployment wants it; falls back to the
    /// global default otherwise.
    pub fn min_edge(&self, category: Category) -> f64 {
        let key = format!("{category:?}").to_lowercase();
        *self
            .min_edge_overrides
            .get(&key)
            .unwrap_or(&category.min_edge_baseline())
    }

    /// Load a base config, optionally overlaid with a TOML file, then with
    /// environment variables (highest precedence), mirroring the teacher's
    /// `Config::from_env` but generalized to the larger option set.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, CoreError> {
        dotenv::dotenv().ok();

        let mut cfg = Config::default();

        if let Some(path) = toml_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| CoreError::ConfigInvalid(format!("reading {path:?}: {e}")))?;
                cfg = toml::from_str(&text)
                    .map_err(|e| CoreError::ConfigInvalid(format!("parsing {path:?}: {e}")))?;
            }
        }

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_override {
            ($field:expr, $name:expr, $parse:expr) => {
                if let Ok(raw) = std::env::var($name) {
                    if let Ok(parsed) = $parse(raw) {
                        $field = parsed;
                    }
                }
            };
        }

        env_override!(self.max_markets, "MAX_MARKETS", |s: String| s.parse());
        env_override!(self.min_liquidity_usd, "MIN_LIQUIDITY", |s: String| s
            .parse());
        env_override!(self.max_signal_history, "MAX_SIGNAL_HISTORY", |s: String| s
            .parse());
        env_override!(self.max_unknowns, "MAX_UNKNOWNS", |s: String| s.parse());
        env_override!(self.poll_interval_ms, "POLL_INTERVAL_MS", |s: String| s
            .parse());
        env_override!(
            self.cleanup_interval_ms,
            "CLEANUP_INTERVAL_MS",
            |s: String| s.parse()
        );
        env_override!(self.mem_critical_mb, "MEM_CRITICAL_MB", |s: String| s
            .parse());
        env_override!(self.mem_emergency_mb, "MEM_EMERGENCY_MB", |s: String| s
            .parse());
        env_override!(self.min_confidence, "MIN_CONFIDENCE", |s: String| s
            .parse());
        env_override!(self.max_width, "MAX_WIDTH", |s: String| s.parse());
        env_override!(
            self.max_position_size_usd,
            "MAX_POSITION_SIZE_USD",
            |s: String| s.parse()
        );
        env_override!(
            self.daily_loss_limit_usd,
            "DAILY_LOSS_LIMIT_USD",
            |s: String| s.parse()
        );
        env_override!(self.max_open_positions, "MAX_OPEN_POSITIONS", |s: String| s
            .parse());
        env_override!(
            self.virtual_capital_usd,
            "VIRTUAL_CAPITAL_USD",
            |s: String| s.parse()
        );
        env_override!(
            self.resolution_check_ms,
            "RESOLUTION_CHECK_MS",
            |s: String| s.parse()
        );
        if let Ok(path) = std::env::var("POSITION_STORE_PATH") {
            self.position_store_path = path;
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.min_confidence < 30.0 || self.min_confidence > 95.0 {
            return Err(CoreError::ConfigInvalid(
                "min_confidence out of [30,95]".into(),
            ));
        }
        if self.max_width <= 0.0 || self.max_width > 100.0 {
            return Err(CoreError::ConfigInvalid("max_width out of (0,100]".into()));
        }
        if self.kelly_fraction <= 0.0 || self.kelly_fraction > 1.0 {
            return Err(CoreError::ConfigInvalid(
                "kelly_fraction out of (0,1]".into(),
            ));
        }
        if self.mem_emergency_mb <= self.mem_critical_mb {
            return Err(CoreError::ConfigInvalid(
                "mem_emergency_mb must exceed mem_critical_mb".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn min_edge_falls_back_to_baseline() {
        let cfg = Config::default();
        assert_eq!(cfg.min_edge(Category::Crypto), 15.0);
    }

    #[test]
    fn min_edge_override_applies() {
        let mut cfg = Config::default();
        cfg.min_edge_overrides.insert("crypto".to_string(), 18.0);
        assert_eq!(cfg.min_edge(Category::Crypto), 18.0);
    }

    #[test]
    fn rejects_bad_confidence_bound() {
        let mut cfg = Config::default();
        cfg.min_confidence = 10.0;
        assert!(cfg.validate().is_err());
    }
}
