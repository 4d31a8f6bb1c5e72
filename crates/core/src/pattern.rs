//! Pattern model - learned patterns and the fast-tier ("System 1") set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::TransferId;
use crate::lenient;
use crate::Time;

/// A pattern accumulated from repeated outcomes by an external learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LearnedPattern {
    /// Unique key
    pub key: String,

    /// Pattern type (e.g. "routing", "tool-choice")
    #[serde(rename = "type")]
    pub pattern_type: String,

    /// Category the pattern was learned under
    pub category: String,

    /// Confidence in [0, 1]
    #[serde(deserialize_with = "lenient::number")]
    pub confidence: f64,

    /// Successes in a row
    #[serde(deserialize_with = "lenient::integer")]
    pub consecutive_successes: i64,

    /// What the pattern captures
    pub insight: String,

    /// Observations behind the confidence
    #[serde(deserialize_with = "lenient::integer")]
    pub sample_size: i64,
}

impl LearnedPattern {
    /// Create a pattern with a key, confidence and success streak.
    pub fn new(key: impl Into<String>, confidence: f64, consecutive_successes: i64) -> Self {
        Self {
            key: key.into(),
            confidence,
            consecutive_successes,
            ..Default::default()
        }
    }
}

/// Lifecycle status of a fast-tier pattern.
///
/// Demotion removes the entry, so the only stored status is `Active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// In the fast tier
    #[default]
    Active,
}

/// A pattern currently in the fast, pattern-matched tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FastTierPattern {
    /// Unique key
    pub key: String,

    /// Pattern type
    #[serde(rename = "type", default)]
    pub pattern_type: String,

    /// Category
    #[serde(default)]
    pub category: String,

    /// Confidence at promotion time
    pub confidence: f64,

    /// Status
    #[serde(default)]
    pub status: PatternStatus,

    /// How many times the key has been promoted while active
    #[serde(default)]
    pub promotion_count: u64,

    /// Reported uses
    #[serde(default)]
    pub usage_count: u64,

    /// Reported failures
    #[serde(default)]
    pub failure_count: u64,

    /// Failures in a row
    #[serde(default)]
    pub consecutive_failures: u64,

    /// Tier the pattern came from
    #[serde(default)]
    pub source: String,

    /// What the pattern captures
    #[serde(default)]
    pub insight: String,

    /// Last promotion
    pub promoted_at: Time,

    /// Last reported use
    #[serde(default)]
    pub last_used_at: Option<Time>,

    /// Last reported success
    #[serde(default)]
    pub last_success_at: Option<Time>,
}

impl FastTierPattern {
    /// Failures per use, 0 when unused.
    pub fn error_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.usage_count as f64
        }
    }
}

/// Kind of transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferAction {
    /// Explicit promotion
    Promote,
    /// Explicit demotion
    Demote,
    /// Demotion triggered by usage feedback
    AutoDemote,
    /// Batch reconciliation
    HotSwap,
}

impl TransferAction {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Promote => "promote",
            TransferAction::Demote => "demote",
            TransferAction::AutoDemote => "auto-demote",
            TransferAction::HotSwap => "hot-swap",
        }
    }
}

impl std::fmt::Display for TransferAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransferAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promote" => Ok(TransferAction::Promote),
            "demote" => Ok(TransferAction::Demote),
            "auto-demote" => Ok(TransferAction::AutoDemote),
            "hot-swap" => Ok(TransferAction::HotSwap),
            other => Err(format!("unknown transfer action '{}'", other)),
        }
    }
}

/// Immutable record of a promotion, demotion or hot-swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLogEntry {
    /// Unique identifier
    pub id: TransferId,
    /// Event kind
    pub action: TransferAction,
    /// Affected key for single-pattern events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Keys promoted by a hot-swap
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub promoted: Vec<String>,
    /// Keys demoted by a hot-swap
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demoted: Vec<String>,
    /// Why it happened
    pub reason: String,
    /// When it happened
    pub timestamp: Time,
}

impl TransferLogEntry {
    /// Entry for a single-key event.
    pub fn single(action: TransferAction, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: TransferId::new(),
            action,
            key: Some(key.into()),
            promoted: Vec::new(),
            demoted: Vec::new(),
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Entry for a hot-swap batch.
    pub fn hot_swap(promoted: Vec<String>, demoted: Vec<String>) -> Self {
        let reason = format!(
            "Hot-swap promoted {} and demoted {} pattern(s)",
            promoted.len(),
            demoted.len()
        );
        Self {
            id: TransferId::new(),
            action: TransferAction::HotSwap,
            key: None,
            promoted,
            demoted,
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Persisted fast-tier document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivePatternDocument {
    /// Active patterns, unique by key
    pub patterns: Vec<FastTierPattern>,
    /// Last write
    pub updated_at: Option<Time>,
}

/// A pattern source document written by an external learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PatternSourceDocument {
    /// Category -> learned patterns
    pub categories: BTreeMap<String, Vec<LearnedPattern>>,
    /// Last write
    pub updated_at: Option<Time>,
}

impl PatternSourceDocument {
    /// All patterns, with an empty category filled from the map key.
    pub fn patterns(&self) -> Vec<LearnedPattern> {
        self.categories
            .iter()
            .flat_map(|(category, patterns)| {
                patterns.iter().cloned().map(move |mut p| {
                    if p.category.is_empty() {
                        p.category = category.clone();
                    }
                    p
                })
            })
            .collect()
    }
}
