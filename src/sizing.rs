//! Position sizing policy (spec §4.4: "consumed from an external sizing
//! policy (Kelly-fraction style); the core treats it as a pure function").
//!
//! Generalized from the teacher's `vault/kelly.rs` fractional-Kelly
//! calculator: same shape (full Kelly, fractional multiplier, max-position
//! cap, minimum-position floor) but parameterized on `edge`/`confidence` as
//! percentage points rather than hardcoded to one bankroll/fraction pair.
//! It is a pure function and it is never allowed to turn `NONE` into a
//! trade - callers only invoke it once gates 1-7 have already passed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingParams {
    pub capital_usd: f64,
    pub kelly_fraction: f64,
    pub max_position_pct: f64,
    pub min_position_usd: f64,
    pub max_position_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingResult {
    pub size_usd: f64,
    pub full_kelly_fraction: f64,
    pub actual_fraction: f64,
    pub should_trade: bool,
    pub skip_reason: Option<String>,
}

/// `confidence` and `market_price` are both percentage points in [0,100]
/// here (the engine's native units), not the [0,1] probabilities the
/// teacher's `kelly.rs` used - converted internally.
pub fn size_position(confidence_pct: f64, market_price_pct: f64, params: &SizingParams) -> SizingResult {
    let confidence = confidence_pct / 100.0;
    let market_price = market_price_pct / 100.0;

    if !(market_price > 0.0 && market_price < 1.0) {
        return no_trade("invalid market price");
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return no_trade("invalid confidence value");
    }

    let edge = confidence - market_price;
    if edge <= 0.0 {
        return no_trade(&format!(
            "no edge: confidence {:.1}% <= market {:.1}%",
            confidence * 100.0,
            market_price * 100.0
        ));
    }

    let odds = (1.0 / market_price) - 1.0;
    let p = confidence;
    let q = 1.0 - p;
    let full_kelly = ((p * odds - q) / odds).clamp(0.0, 1.0);

    let actual_fraction = full_kelly * params.kelly_fraction;
    let capped_fraction = actual_fraction.min(params.max_position_pct);

    let size_usd = (params.capital_usd * capped_fraction).min(params.max_position_usd);

    if size_usd < params.min_position_usd {
        return SizingResult {
            size_usd: 0.0,
            full_kelly_fraction: full_kelly,
            actual_fraction: capped_fraction,
            should_trade: false,
            skip_reason: Some(format!(
                "position ${size_usd:.2} below minimum ${:.2}",
                params.min_position_usd
            )),
        };
    }

    SizingResult {
        size_usd,
        full_kelly_fraction: full_kelly,
        actual_fraction: capped_fraction,
        should_trade: true,
        skip_reason: None,
    }
}

fn no_trade(reason: &str) -> SizingResult {
    SizingResult {
        size_usd: 0.0,
        full_kelly_fraction: 0.0,
        actual_fraction: 0.0,
        should_trade: false,
        skip_reason: Some(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SizingParams {
        SizingParams {
            capital_usd: 10_000.0,
            kelly_fraction: 0.25,
            max_position_pct: 0.10,
            min_position_usd: 1.0,
            max_position_usd: 100.0,
        }
    }

    #[test]
    fn positive_edge_sizes_a_trade() {
        let r = size_position(60.0, 50.0, &params());
        assert!(r.should_trade);
        assert!(r.size_usd > 0.0);
    }

    #[test]
    fn no_edge_skips() {
        let r = size_position(40.0, 50.0, &params());
        assert!(!r.should_trade);
    }

    #[test]
    fn respects_max_position_usd_cap() {
        let mut p = params();
        p.capital_usd = 1_000_000.0;
        let r = size_position(95.0, 10.0, &p);
        assert!(r.size_usd <= p.max_position_usd);
    }
}
