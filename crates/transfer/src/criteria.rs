//! Promotion and demotion thresholds.

use kaizen_core::{FastTierPattern, LearnedPattern};
use serde::{Deserialize, Serialize};

/// Evidence required to enter, and tolerated before leaving, the fast tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferCriteria {
    /// Successes in a row needed for promotion (inclusive)
    pub min_consecutive_successes: i64,
    /// Confidence a pattern must exceed for promotion (exclusive)
    pub min_confidence: f64,
    /// Failures in a row that trigger demotion (inclusive)
    pub max_consecutive_failures: u64,
    /// Uses before the error rate is considered
    pub min_usage_for_error_rate: u64,
    /// Error rate above which a pattern is demoted (exclusive)
    pub max_error_rate: f64,
}

impl Default for TransferCriteria {
    fn default() -> Self {
        Self {
            min_consecutive_successes: 3,
            min_confidence: 0.8,
            max_consecutive_failures: 2,
            min_usage_for_error_rate: 5,
            max_error_rate: 0.2,
        }
    }
}

/// Why an active pattern should leave the fast tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemotionReason {
    /// Too many failures in a row
    ConsecutiveFailures(u64),
    /// Failure share too high over enough uses
    ErrorRate(f64),
}

impl std::fmt::Display for DemotionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsecutiveFailures(n) => write!(f, "{} consecutive failures", n),
            Self::ErrorRate(rate) => write!(f, "error rate {:.0}% exceeds threshold", rate * 100.0),
        }
    }
}

impl TransferCriteria {
    /// Why `pattern` cannot be promoted, or `None` if it can.
    pub fn promotion_rejection(&self, pattern: &LearnedPattern) -> Option<String> {
        if pattern.key.trim().is_empty() {
            return Some("pattern key is missing".to_string());
        }
        if pattern.consecutive_successes < self.min_consecutive_successes {
            return Some(format!(
                "needs {} consecutive successes, has {}",
                self.min_consecutive_successes, pattern.consecutive_successes
            ));
        }
        if pattern.confidence.is_nan() || pattern.confidence <= self.min_confidence {
            return Some(format!(
                "confidence {:.2} does not exceed {:.2}",
                pattern.confidence, self.min_confidence
            ));
        }
        None
    }

    /// Whether `pattern` meets the promotion bar.
    pub fn is_promotable(&self, pattern: &LearnedPattern) -> bool {
        self.promotion_rejection(pattern).is_none()
    }

    /// Why `pattern` should be demoted, if at all. Consecutive failures are
    /// reported ahead of the error rate when both apply.
    pub fn demotion_reason(&self, pattern: &FastTierPattern) -> Option<DemotionReason> {
        if pattern.consecutive_failures >= self.max_consecutive_failures {
            return Some(DemotionReason::ConsecutiveFailures(pattern.consecutive_failures));
        }
        let rate = pattern.error_rate();
        if pattern.usage_count >= self.min_usage_for_error_rate && rate > self.max_error_rate {
            return Some(DemotionReason::ErrorRate(rate));
        }
        None
    }

    /// Distance from the confidence bar, 0 once reached.
    pub fn confidence_gap(&self, pattern: &LearnedPattern) -> f64 {
        (self.min_confidence - pattern.confidence).max(0.0)
    }

    /// Successes still missing, 0 once reached.
    pub fn successes_gap(&self, pattern: &LearnedPattern) -> u64 {
        self.min_consecutive_successes
            .saturating_sub(pattern.consecutive_successes)
            .max(0) as u64
    }
}
