//! Signal Classifier (C1, spec §4.1).
//!
//! Tags a raw textual observation with class/direction/strength/conflict,
//! or drops it below the relevance floor. Classification itself never
//! errors (§4.1: "classification itself never errors"); a `None` return is
//! the only failure mode and it is not an error condition, just "nothing
//! to ingest this tick."

use chrono::{DateTime, Utc};

use crate::models::{Direction, Signal, SignalClass, Strength};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Rss,
    SocialRss,
    Hn,
    SocialApi,
    Polling,
}

#[derive(Debug, Clone)]
pub struct RawItem {
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub origin: Origin,
}

const RELEVANCE_FLOOR: f64 = 0.3;

/// Positive/negative indicator words for direction scoring. Small and
/// data-driven by design (§9: "prefer tagged variants/small closed sums
/// over dynamic dispatch") - a real deployment would swap this table out,
/// not the classifier's control flow.
const POSITIVE_WORDS: &[&str] = &[
    "approve", "approved", "win", "wins", "confirm", "confirmed", "pass", "passed", "victory",
    "agree", "agreement", "surge", "rally", "breakthrough", "success",
];
const NEGATIVE_WORDS: &[&str] = &[
    "reject", "rejected", "lose", "loses", "deny", "denied", "fail", "failed", "collapse",
    "withdraw", "cancel", "cancelled", "crash", "delay", "delayed",
];

/// Sources mapped to their signal class by lexicon (§4.1 step 2),
/// highest-confidence-first. A source not listed here falls through to
/// `origin`-based classification.
const AUTHORITATIVE_SOURCES: &[&str] = &[
    "sec.gov", "courtlistener", "federal register", "official", "regulator", "court filing",
];
const PROCEDURAL_SOURCES: &[&str] = &["filing", "docket", "scheduling order", "sec filing"];
const QUANTITATIVE_SOURCES: &[&str] = &["poll", "polling", "survey", "metric", "fivethirtyeight"];
const INTERPRETIVE_SOURCES: &[&str] = &["op-ed", "analysis", "opinion", "commentary"];

pub struct SignalClassifier;

impl SignalClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw item against a market's keyword set and its recent
    /// signal history (for the conflict flag). Returns `None` below the
    /// relevance floor.
    pub fn classify(
        &self,
        item: &RawItem,
        keywords: &[String],
        recent_history: &[Signal],
    ) -> Option<Signal> {
        let relevance = Self::relevance(item, keywords);
        if relevance < RELEVANCE_FLOOR {
            return None;
        }

        let class = Self::classify_source(&item.source, item.origin);
        let direction = Self::classify_direction(item);
        let strength = Self::classify_strength(class, relevance);
        let conflicts = Self::conflicts_with_majority(direction, recent_history);

        Some(Signal {
            class,
            direction,
            strength,
            conflicts_with_existing: conflicts,
            timestamp: item.published_at,
            source: Some(item.source.clone()),
            description: Some(item.title.clone()),
        })
    }

    /// §4.1 step 1: `r = 0.3·keyword_hits_in_title + 0.15·keyword_hits_in_body`,
    /// clipped to [0,1].
    fn relevance(item: &RawItem, keywords: &[String]) -> f64 {
        if keywords.is_empty() {
            return 1.0;
        }
        let title_lower = item.title.to_lowercase();
        let body_lower = item.body.to_lowercase();

        let title_hits = keywords
            .iter()
            .filter(|k| title_lower.contains(&k.to_lowercase()))
            .count() as f64;
        let body_hits = keywords
            .iter()
            .filter(|k| body_lower.contains(&k.to_lowercase()))
            .count() as f64;

        (0.3 * title_hits + 0.15 * body_hits).clamp(0.0, 1.0)
    }

    /// §4.1 step 2: class by source/origin lexicon, highest-confidence-first.
    fn classify_source(source: &str, origin: Origin) -> SignalClass {
        let s = source.to_lowercase();
        if AUTHORITATIVE_SOURCES.iter().any(|needle| s.contains(needle)) {
            return SignalClass::Authoritative;
        }
        if PROCEDURAL_SOURCES.iter().any(|needle| s.contains(needle)) {
            return SignalClass::Procedural;
        }
        if QUANTITATIVE_SOURCES.iter().any(|needle| s.contains(needle)) {
            return SignalClass::Quantitative;
        }
        if INTERPRETIVE_SOURCES.iter().any(|needle| s.contains(needle)) {
            return SignalClass::Interpretive;
        }

        match origin {
            Origin::Rss => SignalClass::Procedural,
            Origin::Hn => SignalClass::Interpretive,
            Origin::SocialRss | Origin::SocialApi => SignalClass::Speculative,
            Origin::Polling => SignalClass::Quantitative,
        }
    }

    /// §4.1 step 3: signed lexicon sum; ties -> neutral.
    fn classify_direction(item: &RawItem) -> Direction {
        let text = format!("{} {}", item.title, item.body).to_lowercase();
        let pos = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as i64;
        let neg = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as i64;
        match pos.cmp(&neg) {
            std::cmp::Ordering::Greater => Direction::Up,
            std::cmp::Ordering::Less => Direction::Down,
            std::cmp::Ordering::Equal => Direction::Neutral,
        }
    }

    /// §4.1 step 4: strength 1..5 from a monotone combination of class
    /// credibility and relevance, round-half-up.
    fn classify_strength(class: SignalClass, relevance: f64) -> Strength {
        let raw = 1.0 + 4.0 * (0.6 * class.credibility() + 0.4 * relevance);
        let rounded = (raw + 0.5).floor().clamp(1.0, 5.0) as u8;
        Strength::new(rounded).unwrap_or_else(|| Strength::new(1).unwrap())
    }

    /// §4.1 step 5: conflict flag set if direction opposes the majority
    /// direction in the market's recent signal history.
    fn conflicts_with_majority(direction: Direction, recent_history: &[Signal]) -> bool {
        if direction == Direction::Neutral || recent_history.is_empty() {
            return false;
        }
        let up = recent_history
            .iter()
            .filter(|s| s.direction == Direction::Up)
            .count();
        let down = recent_history
            .iter()
            .filter(|s| s.direction == Direction::Down)
            .count();
        let majority = if up > down {
            Direction::Up
        } else if down > up {
            Direction::Down
        } else {
            return false;
        };
        direction != majority
    }
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new()
    }
}
