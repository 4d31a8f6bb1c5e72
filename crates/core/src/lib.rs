//! Kaizen core data models.
//!
//! This crate defines the data structures shared by the self-learning
//! engines: group-relative ranking (GRPO), self evaluation, and the
//! fast-tier pattern transfer.

#![warn(missing_docs)]

// Identities
mod id;

// Lenient numeric decoding for metric bags
mod lenient;

// Engine models
mod evaluation;
mod grpo;
mod pattern;

// Re-exports
pub use id::*;

pub use evaluation::{
    Dimension, DimensionKind, Dimensions, Evaluation, Grade, ResultMetrics, TaskInfo,
    TaskResult, UserFeedback,
};
pub use grpo::{
    Candidate, ExecutionResult, GroupResult, GrpoRound, RankingEntry, RoundEntry, RoundKind,
    Task, TeamCandidate, TeamVariant, WeightDocument, MAX_WEIGHT, MIN_WEIGHT, NEUTRAL_WEIGHT,
};
pub use pattern::{
    ActivePatternDocument, FastTierPattern, LearnedPattern, PatternSourceDocument,
    PatternStatus, TransferAction, TransferLogEntry,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
