//! Group-relative ranking model - candidates, rankings, rounds and weights.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::{CandidateId, RoundId};
use crate::lenient;
use crate::Time;

/// Lower bound for any persisted weight.
pub const MIN_WEIGHT: f64 = 0.01;

/// Upper bound for any persisted weight.
pub const MAX_WEIGHT: f64 = 5.0;

/// Weight assumed for a label with no history.
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// A task attempted by a group of candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    /// Caller-side task identifier
    pub id: String,

    /// Task domain (e.g. "frontend", "backend")
    pub domain: String,

    /// Free-form description
    pub description: String,
}

impl Task {
    /// Create a task in the given domain.
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            description: String::new(),
        }
    }
}

/// Raw outcome metrics of one candidate's attempt.
///
/// Every field is optional on the wire; absent or malformed values decode as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Process exit code (0 = success)
    #[serde(deserialize_with = "lenient::integer")]
    pub exit_code: i64,

    /// Number of errors reported
    #[serde(alias = "errors", deserialize_with = "lenient::number")]
    pub error_count: f64,

    /// Wall-clock duration in milliseconds
    #[serde(alias = "duration", deserialize_with = "lenient::number")]
    pub duration_ms: f64,

    /// Length of the issued command or plan
    #[serde(deserialize_with = "lenient::number")]
    pub command_length: f64,

    /// Number of unintended side effects observed
    #[serde(deserialize_with = "lenient::number")]
    pub side_effects: f64,

    /// Tasks handed to a team
    #[serde(deserialize_with = "lenient::number")]
    pub task_count: f64,

    /// Tasks the team finished successfully
    #[serde(deserialize_with = "lenient::number")]
    pub success_count: f64,

    /// Tasks the team completed regardless of outcome
    #[serde(deserialize_with = "lenient::number")]
    pub completed_count: f64,

    /// Team size actually used
    #[serde(deserialize_with = "lenient::number")]
    pub team_size: f64,
}

/// One attempted strategy variant for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Unique identifier
    pub id: CandidateId,

    /// Task this candidate attempted
    pub task_id: String,

    /// Task domain
    pub domain: String,

    /// Strategy label, also the weight key
    pub strategy: String,

    /// Position in the generated group
    pub index: usize,

    /// Strategy parameters
    #[serde(default)]
    pub params: BTreeMap<String, f64>,

    /// Outcome of the attempt (filled in after execution)
    #[serde(default)]
    pub result: ExecutionResult,
}

impl Candidate {
    /// Attach an execution result.
    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.result = result;
        self
    }
}

/// Pattern, size and domain of a team composition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamVariant {
    /// Coordination pattern (e.g. "parallel")
    pub pattern: String,

    /// Number of agents
    pub size: usize,

    /// Task domain
    pub domain: String,
}

impl TeamVariant {
    /// Weight-table key, `pattern|size|domain`.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.pattern, self.size, self.domain)
    }

    /// Parse a `pattern|size|domain` key.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, '|');
        let pattern = parts.next()?.to_string();
        let size = parts.next()?.parse().ok()?;
        let domain = parts.next()?.to_string();
        if pattern.is_empty() {
            return None;
        }
        Some(Self { pattern, size, domain })
    }
}

/// One attempted team composition for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCandidate {
    /// Unique identifier
    pub id: CandidateId,

    /// Task this team attempted
    pub task_id: String,

    /// Coordination pattern
    pub pattern: String,

    /// Number of agents
    pub size: usize,

    /// Task domain
    pub domain: String,

    /// Agent roles in the team
    #[serde(default)]
    pub agents: Vec<String>,

    /// Position in the generated group
    pub index: usize,

    /// Outcome of the attempt
    #[serde(default)]
    pub result: ExecutionResult,
}

impl TeamCandidate {
    /// The team's pattern/size/domain triple.
    pub fn variant(&self) -> TeamVariant {
        TeamVariant {
            pattern: self.pattern.clone(),
            size: self.size,
            domain: self.domain.clone(),
        }
    }

    /// Attach an execution result.
    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.result = result;
        self
    }
}

/// One candidate's evaluated position in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// Evaluated candidate
    pub candidate_id: CandidateId,

    /// Weight key: strategy label, or `pattern|size|domain` for teams
    pub label: String,

    /// Per-rule scores, each in [0, 1]
    pub scores: BTreeMap<String, f64>,

    /// Mean of the rule scores, in [0, 1]
    pub composite: f64,

    /// 1-based rank, 1 = best
    pub rank: usize,
}

/// Outcome of evaluating one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    /// Task the group attempted, if known
    pub task_id: Option<String>,

    /// Entries ordered by rank
    pub rankings: Vec<RankingEntry>,

    /// Rank 1 entry
    pub best: Option<RankingEntry>,

    /// Rank N entry
    pub worst: Option<RankingEntry>,

    /// max(composite) - min(composite)
    pub spread: f64,
}

impl GroupResult {
    /// Number of ranked candidates.
    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    /// Whether the group had no candidates.
    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }
}

/// Kind of group a round evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundKind {
    /// Strategy candidates for one task
    Task,
    /// Team compositions for one task
    Team,
}

impl RoundKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundKind::Task => "task",
            RoundKind::Team => "team",
        }
    }
}

impl std::fmt::Display for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoundKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "task" => Ok(RoundKind::Task),
            "team" => Ok(RoundKind::Team),
            other => Err(format!("unknown round kind '{}', expected task or team", other)),
        }
    }
}

/// Per-label summary stored with a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundEntry {
    /// Weight key
    pub label: String,
    /// Rank within the group
    pub rank: usize,
    /// Composite score
    pub composite: f64,
    /// Rank-derived advantage in [-1, 1]
    pub advantage: f64,
    /// Weight after the update
    pub weight: f64,
}

/// Append-only history entry of one group evaluation and weight update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpoRound {
    /// Unique identifier
    pub id: RoundId,
    /// Task or team round
    pub kind: RoundKind,
    /// When the update was applied
    pub timestamp: Time,
    /// Task the group attempted, if known
    #[serde(default)]
    pub task_id: Option<String>,
    /// Learning rate used
    pub learning_rate: f64,
    /// Composite spread of the group
    pub spread: f64,
    /// Per-label outcome
    #[serde(default)]
    pub entries: Vec<RoundEntry>,
}

/// Persisted weight store document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeightDocument {
    /// Round history, oldest first
    pub rounds: Vec<GrpoRound>,
    /// Strategy label -> weight
    pub weights: BTreeMap<String, f64>,
    /// `pattern|size|domain` -> weight
    pub team_weights: BTreeMap<String, f64>,
    /// Last write
    pub updated_at: Option<Time>,
}

impl WeightDocument {
    /// The weight table for a round kind.
    pub fn table(&self, kind: RoundKind) -> &BTreeMap<String, f64> {
        match kind {
            RoundKind::Task => &self.weights,
            RoundKind::Team => &self.team_weights,
        }
    }

    /// Mutable weight table for a round kind.
    pub fn table_mut(&mut self, kind: RoundKind) -> &mut BTreeMap<String, f64> {
        match kind {
            RoundKind::Task => &mut self.weights,
            RoundKind::Team => &mut self.team_weights,
        }
    }
}
