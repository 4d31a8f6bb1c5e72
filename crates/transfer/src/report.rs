//! Results returned by the transfer engine.

use kaizen_core::{FastTierPattern, LearnedPattern, Time};
use serde::{Deserialize, Serialize};

/// Result of a promotion attempt. Rejections are not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    /// Whether the pattern is now active
    pub promoted: bool,
    /// Pattern key
    pub key: String,
    /// Rejection reason, or a note on what happened
    pub reason: String,
    /// The active entry after promotion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<FastTierPattern>,
}

impl PromotionOutcome {
    pub(crate) fn rejected(key: &str, reason: impl Into<String>) -> Self {
        Self {
            promoted: false,
            key: key.to_string(),
            reason: reason.into(),
            pattern: None,
        }
    }
}

/// Result of a demotion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemotionOutcome {
    /// Whether the key was removed
    pub demoted: bool,
    /// Pattern key
    pub key: String,
    /// Given reason, or why nothing happened
    pub reason: String,
}

/// Result of a usage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageOutcome {
    /// Whether an active pattern was found and updated
    pub updated: bool,
    /// Whether the report pushed the pattern out of the fast tier
    pub auto_demoted: bool,
    /// Demotion or not-found reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Counters after the update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<FastTierPattern>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotSwapReport {
    /// Keys newly promoted
    pub promoted: Vec<String>,
    /// Keys removed
    pub demoted: Vec<String>,
    /// Active patterns left as they were
    pub unchanged: usize,
    /// When the pass ran
    pub timestamp: Time,
}

impl HotSwapReport {
    /// Whether anything was promoted or demoted.
    pub fn changed(&self) -> bool {
        !self.promoted.is_empty() || !self.demoted.is_empty()
    }
}

/// A source pattern that does not meet the promotion bar yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BelowThreshold {
    /// The pattern
    pub pattern: LearnedPattern,
    /// Confidence still missing
    pub confidence_gap: f64,
    /// Successes still missing
    pub successes_gap: u64,
}

/// Source patterns grouped by promotion status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCandidates {
    /// Eligible and not active, highest confidence first
    pub candidates: Vec<LearnedPattern>,
    /// Keys already in the fast tier
    pub already_promoted: Vec<String>,
    /// Not eligible yet
    pub below_threshold: Vec<BelowThreshold>,
}

/// Aggregate view of the fast tier and the transfer log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    /// Patterns in the fast tier
    pub active_count: usize,
    /// Promotions in the retained log, hot-swaps included
    pub total_promotions: usize,
    /// Demotions in the retained log, automatic and hot-swap included
    pub total_demotions: usize,
    /// Automatic demotions from usage reports
    pub auto_demotions: usize,
    /// Hot-swap passes that changed something
    pub hot_swaps: usize,
    /// Mean confidence of active patterns
    pub mean_confidence: f64,
    /// Mean usage count of active patterns
    pub mean_usage: f64,
    /// Last write of the active set
    pub updated_at: Option<Time>,
}
