//! Group-relative ranking (GRPO) - ranks candidates for the same task
//! against each other and keeps a bounded weight table that biases future
//! recommendations.

#![warn(missing_docs, unused_crate_dependencies)]

mod rules;
mod candidates;
mod ranking;
mod engine;

pub use rules::{RuleSet, ScoringRule};
pub use candidates::{generate_candidates, generate_team_candidates, DEFAULT_STRATEGY};
pub use ranking::{
    advantage, evaluate_group, evaluate_group_seeded, evaluate_team_group, self_evaluation_score,
};
pub use engine::{
    GrpoConfig, GrpoEngine, GrpoStats, Recommendation, RecommendationSource, UpdateOptions,
    WeightedLabel,
};
