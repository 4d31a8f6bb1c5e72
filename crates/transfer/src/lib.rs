//! Knowledge transfer between the deliberate tier and the fast,
//! pattern-matched tier.
//!
//! Patterns with enough evidence are promoted into the active set; active
//! patterns that start failing are removed again. `hot_swap` reconciles
//! both directions as one batch under a cross-process named lock.

#![warn(missing_docs, unused_crate_dependencies)]

mod criteria;
mod report;
mod engine;

pub use criteria::{DemotionReason, TransferCriteria};
pub use report::{
    BelowThreshold, DemotionOutcome, HotSwapReport, PromotionCandidates, PromotionOutcome, TransferStats,
    UsageOutcome,
};
pub use engine::{KnowledgeTransfer, TransferConfig};
