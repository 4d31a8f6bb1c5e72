//! Self evaluation - rule-based quality scores for completed tasks.
//!
//! Scores are produced from structured task results only, so they can be
//! used directly as a reward signal by the other engines.

#![warn(missing_docs, unused_crate_dependencies)]

mod scoring;
mod analysis;
mod engine;

pub use scoring::{score_dimensions, overall_score, feedback_for, GOOD_THRESHOLD, SUGGESTION_THRESHOLD};
pub use analysis::{
    improvement_suggestions, learning_trends, team_performance, ImprovementReport,
    LearningTrends, TaskTypePerformance, TeamPerformance, Trend, WeakArea,
};
pub use engine::{SelfEvaluator, EvaluatorConfig};
