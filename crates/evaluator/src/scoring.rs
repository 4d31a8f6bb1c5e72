//! Per-dimension scoring rules.

use kaizen_core::{Dimension, DimensionKind, Dimensions, Grade, ResultMetrics, TaskResult, UserFeedback};

/// Overall score at or above which a result counts as good.
pub const GOOD_THRESHOLD: f64 = 3.5;

/// Mean below which a dimension or task type needs improvement.
pub const SUGGESTION_THRESHOLD: f64 = 3.0;

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 5.0;

/// Efficiency bands: (upper bound in ms, score).
const EFFICIENCY_BANDS: [(f64, f64); 4] = [
    (30_000.0, 5.0),
    (120_000.0, 4.0),
    (300_000.0, 3.0),
    (900_000.0, 2.0),
];

fn accuracy(result: &TaskResult) -> f64 {
    match (result.success, result.tests_pass) {
        (true, true) => 5.0,
        (true, false) => 3.0,
        (false, true) => 2.0,
        (false, false) => 1.0,
    }
}

fn coverage_ratio(metrics: &ResultMetrics) -> Option<f64> {
    let covered = metrics.requirements_covered?;
    let ratio = match metrics.requirements_total {
        Some(total) if total > 0.0 => covered / total,
        _ => covered,
    };
    Some(ratio.clamp(0.0, 1.0))
}

fn completeness(result: &TaskResult) -> f64 {
    if let Some(ratio) = coverage_ratio(&result.metrics) {
        return MIN_SCORE + (MAX_SCORE - MIN_SCORE) * ratio;
    }
    match (result.success, result.tests_pass) {
        (true, true) => 5.0,
        (true, false) => 4.0,
        (false, true) => 2.5,
        (false, false) => 1.0,
    }
}

fn efficiency(duration: Option<f64>) -> f64 {
    let duration = match duration {
        Some(d) if d >= 0.0 => d,
        _ => return 3.0,
    };
    EFFICIENCY_BANDS
        .iter()
        .find(|(limit, _)| duration < *limit)
        .map(|(_, score)| *score)
        .unwrap_or(MIN_SCORE)
}

fn satisfaction(metrics: &ResultMetrics) -> f64 {
    match metrics.user_feedback {
        Some(UserFeedback::Positive) => 5.0,
        Some(UserFeedback::Negative) => 1.0,
        None if metrics.revision_requested => 3.0,
        None => 3.5,
    }
}

/// Score every dimension of a result.
pub fn score_dimensions(result: &TaskResult) -> Dimensions {
    let dim = |kind: DimensionKind, score: f64| Dimension {
        score: score.clamp(MIN_SCORE, MAX_SCORE),
        weight: kind.weight(),
    };
    Dimensions {
        accuracy: dim(DimensionKind::Accuracy, accuracy(result)),
        completeness: dim(DimensionKind::Completeness, completeness(result)),
        efficiency: dim(DimensionKind::Efficiency, efficiency(result.duration)),
        satisfaction: dim(DimensionKind::Satisfaction, satisfaction(&result.metrics)),
    }
}

/// Weighted overall score, in [1, 5].
pub fn overall_score(dimensions: &Dimensions) -> f64 {
    dimensions.weighted_sum().clamp(MIN_SCORE, MAX_SCORE)
}

fn tip(kind: DimensionKind) -> &'static str {
    match kind {
        DimensionKind::Accuracy => "Verify the change works and its tests pass before reporting completion.",
        DimensionKind::Completeness => "Check every stated requirement off before finishing.",
        DimensionKind::Efficiency => "Break the work into smaller steps and cut redundant iterations.",
        DimensionKind::Satisfaction => "Confirm expectations up front to avoid revision requests.",
    }
}

/// Human-readable feedback for a scored result.
pub fn feedback_for(dimensions: &Dimensions, overall: f64, good_threshold: f64) -> String {
    let grade = Grade::from_score(overall);
    if overall >= good_threshold {
        let (strongest, best) = dimensions
            .iter()
            .fold(None::<(DimensionKind, f64)>, |acc, (kind, d)| match acc {
                Some((_, score)) if score >= d.score => acc,
                _ => Some((kind, d.score)),
            })
            .unwrap_or((DimensionKind::Accuracy, overall));
        return format!(
            "Good result: {:.2}/5 (grade {}). Strongest dimension: {} ({:.1}/5).",
            overall, grade, strongest, best
        );
    }

    let (weakest, worst) = dimensions
        .iter()
        .fold(None::<(DimensionKind, f64)>, |acc, (kind, d)| match acc {
            Some((_, score)) if score <= d.score => acc,
            _ => Some((kind, d.score)),
        })
        .unwrap_or((DimensionKind::Accuracy, overall));
    format!(
        "Scored {:.2}/5 (grade {}). Weakest dimension: {} ({:.1}/5). {}",
        overall,
        grade,
        weakest,
        worst,
        tip(weakest)
    )
}
