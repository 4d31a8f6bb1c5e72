//! Aggregate views over the evaluation history.

use std::collections::BTreeMap;

use kaizen_core::{DimensionKind, Evaluation};
use serde::Serialize;

/// A dimension or task type whose mean fell below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakArea {
    /// Dimension name or task type
    pub name: String,
    /// Mean overall (task types) or mean dimension score
    pub average: f64,
}

/// Output of [`improvement_suggestions`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementReport {
    /// Evaluations considered
    pub sample_size: usize,
    /// Threshold used
    pub threshold: f64,
    /// Mean score per dimension
    pub dimension_averages: BTreeMap<DimensionKind, f64>,
    /// Mean overall per task type
    pub task_type_averages: BTreeMap<String, f64>,
    /// Dimensions below threshold, weakest first
    pub weak_dimensions: Vec<WeakArea>,
    /// Task types below threshold, weakest first
    pub weak_task_types: Vec<WeakArea>,
    /// Human-readable suggestions
    pub suggestions: Vec<String>,
}

/// Aggregate for one task type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTypePerformance {
    /// Task type
    pub task_type: String,
    /// Evaluations of this type
    pub count: usize,
    /// Mean overall score
    pub average: f64,
    /// Mean score per dimension
    pub dimension_averages: BTreeMap<DimensionKind, f64>,
}

/// Output of [`team_performance`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPerformance {
    /// Every task type, best first
    pub groups: Vec<TaskTypePerformance>,
    /// Best `top_n` task types
    pub top: Vec<TaskTypePerformance>,
    /// Worst `top_n` task types, worst first
    pub bottom: Vec<TaskTypePerformance>,
}

/// Direction of the overall score over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trend {
    /// Late windows score higher
    Improving,
    /// Late windows score lower
    Declining,
    /// Within the noise band
    Stable,
    /// Fewer than two full windows
    InsufficientData,
}

/// Output of [`learning_trends`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningTrends {
    /// Classified trend
    pub trend: Trend,
    /// Window size used
    pub window_size: usize,
    /// Evaluations in the history
    pub sample_size: usize,
    /// Mean overall per window, oldest first
    pub window_averages: Vec<f64>,
    /// Last window mean minus first window mean
    pub delta: Option<f64>,
}

/// Change in window mean treated as a real trend.
const TREND_DELTA: f64 = 0.2;

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn dimension_averages<'a>(evaluations: impl Iterator<Item = &'a Evaluation> + Clone) -> BTreeMap<DimensionKind, f64> {
    DimensionKind::ALL
        .iter()
        .map(|kind| {
            let avg = mean(evaluations.clone().map(|e| e.dimensions.get(*kind).score));
            (*kind, avg)
        })
        .collect()
}

fn group_by_task_type(evaluations: &[Evaluation]) -> BTreeMap<String, Vec<&Evaluation>> {
    let mut groups: BTreeMap<String, Vec<&Evaluation>> = BTreeMap::new();
    for evaluation in evaluations {
        let key = if evaluation.task_type.is_empty() {
            "unknown".to_string()
        } else {
            evaluation.task_type.clone()
        };
        groups.entry(key).or_default().push(evaluation);
    }
    groups
}

fn dimension_suggestion(kind: DimensionKind, average: f64) -> String {
    let advice = match kind {
        DimensionKind::Accuracy => "run the full test suite and confirm the change works before reporting completion",
        DimensionKind::Completeness => "list the requirements up front and check each one off before finishing",
        DimensionKind::Efficiency => "split large tasks into smaller steps and avoid redundant iterations",
        DimensionKind::Satisfaction => "confirm expectations early to reduce revision requests",
    };
    format!("{} is averaging {:.2}/5: {}.", capitalize(kind.as_str()), average, advice)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Flag weak dimensions and task types over the latest `lookback` evaluations.
///
/// `evaluations` is ordered oldest first.
pub fn improvement_suggestions(evaluations: &[Evaluation], threshold: f64, lookback: usize) -> ImprovementReport {
    let start = evaluations.len().saturating_sub(lookback);
    let recent = &evaluations[start..];

    if recent.is_empty() {
        return ImprovementReport {
            sample_size: 0,
            threshold,
            dimension_averages: BTreeMap::new(),
            task_type_averages: BTreeMap::new(),
            weak_dimensions: Vec::new(),
            weak_task_types: Vec::new(),
            suggestions: vec!["No evaluations recorded yet; complete some tasks to get suggestions.".to_string()],
        };
    }

    let dimension_averages = dimension_averages(recent.iter());
    let task_type_averages: BTreeMap<String, f64> = group_by_task_type(recent)
        .into_iter()
        .map(|(task_type, group)| (task_type, mean(group.iter().map(|e| e.overall))))
        .collect();

    let mut weak_kinds: Vec<(DimensionKind, f64)> = dimension_averages
        .iter()
        .filter(|(_, avg)| **avg < threshold)
        .map(|(kind, avg)| (*kind, *avg))
        .collect();
    weak_kinds.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut weak_task_types: Vec<WeakArea> = task_type_averages
        .iter()
        .filter(|(_, avg)| **avg < threshold)
        .map(|(name, avg)| WeakArea { name: name.clone(), average: *avg })
        .collect();
    weak_task_types.sort_by(|a, b| a.average.total_cmp(&b.average));

    let mut suggestions: Vec<String> = weak_kinds
        .iter()
        .map(|(kind, avg)| dimension_suggestion(*kind, *avg))
        .collect();
    let weak_dimensions = weak_kinds
        .into_iter()
        .map(|(kind, average)| WeakArea { name: kind.as_str().to_string(), average })
        .collect();
    for weak in &weak_task_types {
        suggestions.push(format!(
            "Task type '{}' is averaging {:.2}/5: review recent '{}' tasks for recurring issues.",
            weak.name, weak.average, weak.name
        ));
    }
    if suggestions.is_empty() {
        suggestions.push(format!(
            "All dimensions and task types are at or above {:.1}/5; keep the current approach.",
            threshold
        ));
    }

    ImprovementReport {
        sample_size: recent.len(),
        threshold,
        dimension_averages,
        task_type_averages,
        weak_dimensions,
        weak_task_types,
        suggestions,
    }
}

/// Group evaluations by task type and surface the best and worst groups.
pub fn team_performance(evaluations: &[Evaluation], top_n: usize) -> TeamPerformance {
    let mut groups: Vec<TaskTypePerformance> = group_by_task_type(evaluations)
        .into_iter()
        .map(|(task_type, group)| TaskTypePerformance {
            task_type,
            count: group.len(),
            average: mean(group.iter().map(|e| e.overall)),
            dimension_averages: dimension_averages(group.iter().copied()),
        })
        .collect();
    groups.sort_by(|a, b| b.average.total_cmp(&a.average));

    let top = groups.iter().take(top_n).cloned().collect();
    let bottom = groups.iter().rev().take(top_n).cloned().collect();

    TeamPerformance { groups, top, bottom }
}

/// Compare early and late windows of the history.
///
/// `evaluations` is ordered oldest first; windows are sequential and
/// non-overlapping, and a trailing partial window is ignored.
pub fn learning_trends(evaluations: &[Evaluation], window_size: usize) -> LearningTrends {
    let window_size = window_size.max(1);
    let window_averages: Vec<f64> = evaluations
        .chunks_exact(window_size)
        .map(|window| mean(window.iter().map(|e| e.overall)))
        .collect();

    let (trend, delta) = match (window_averages.first(), window_averages.last()) {
        (Some(first), Some(last)) if window_averages.len() >= 2 => {
            let delta = last - first;
            let trend = if delta > TREND_DELTA {
                Trend::Improving
            } else if delta < -TREND_DELTA {
                Trend::Declining
            } else {
                Trend::Stable
            };
            (trend, Some(delta))
        }
        _ => (Trend::InsufficientData, None),
    };

    LearningTrends {
        trend,
        window_size,
        sample_size: evaluations.len(),
        window_averages,
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaizen_core::{Dimension, Dimensions, EvaluationId, Grade};

    fn evaluation(task_type: &str, score: f64) -> Evaluation {
        let dim = |kind: DimensionKind| Dimension { score, weight: kind.weight() };
        Evaluation {
            id: EvaluationId::new(),
            task_id: "t".to_string(),
            task_type: task_type.to_string(),
            timestamp: chrono::Utc::now(),
            dimensions: Dimensions {
                accuracy: dim(DimensionKind::Accuracy),
                completeness: dim(DimensionKind::Completeness),
                efficiency: dim(DimensionKind::Efficiency),
                satisfaction: dim(DimensionKind::Satisfaction),
            },
            overall: score,
            grade: Grade::from_score(score),
            feedback: String::new(),
        }
    }

    #[test]
    fn test_suggestions_empty_history() {
        let report = improvement_suggestions(&[], 3.0, 20);
        assert_eq!(report.sample_size, 0);
        assert_eq!(report.suggestions.len(), 1);
        assert!(report.suggestions[0].contains("No evaluations"));
    }

    #[test]
    fn test_suggestions_flag_weak_areas() {
        let mut history = vec![evaluation("feature", 4.5), evaluation("feature", 4.0)];
        let mut weak = evaluation("bugfix", 2.0);
        weak.dimensions.efficiency.score = 1.0;
        history.push(weak);

        let report = improvement_suggestions(&history, 3.0, 20);
        assert_eq!(report.sample_size, 3);
        assert_eq!(report.weak_task_types.len(), 1);
        assert_eq!(report.weak_task_types[0].name, "bugfix");
        assert!(report.weak_dimensions.is_empty());
        assert!(report.suggestions.iter().any(|s| s.contains("'bugfix'")));
    }

    #[test]
    fn test_suggestions_respect_lookback() {
        let history = vec![
            evaluation("feature", 1.0),
            evaluation("feature", 1.0),
            evaluation("feature", 4.0),
            evaluation("feature", 4.0),
        ];
        let report = improvement_suggestions(&history, 3.0, 2);
        assert_eq!(report.sample_size, 2);
        assert!(report.weak_dimensions.is_empty());
        assert!(report.suggestions[0].contains("keep the current approach"));

        let full = improvement_suggestions(&history, 3.0, 10);
        assert_eq!(full.weak_dimensions.len(), 4);
        assert!(full.suggestions.iter().any(|s| s.starts_with("Accuracy is averaging")));
    }

    #[test]
    fn test_team_performance_ordering() {
        let history = vec![
            evaluation("feature", 4.0),
            evaluation("docs", 2.0),
            evaluation("feature", 5.0),
            evaluation("bugfix", 3.0),
        ];
        let perf = team_performance(&history, 1);
        assert_eq!(perf.groups.len(), 3);
        assert_eq!(perf.top[0].task_type, "feature");
        assert_eq!(perf.top[0].count, 2);
        assert!((perf.top[0].average - 4.5).abs() < 1e-9);
        assert_eq!(perf.bottom[0].task_type, "docs");
    }

    #[test]
    fn test_trends_insufficient_below_two_windows() {
        let history: Vec<_> = (0..9).map(|_| evaluation("feature", 3.0)).collect();
        let trends = learning_trends(&history, 5);
        assert_eq!(trends.trend, Trend::InsufficientData);
        assert_eq!(trends.window_averages.len(), 1);
        assert!(trends.delta.is_none());
    }

    #[test]
    fn test_trends_improving_declining_stable() {
        let rising: Vec<_> = [2.0, 2.0, 3.0, 3.0, 4.0, 4.0]
            .iter()
            .map(|s| evaluation("feature", *s))
            .collect();
        assert_eq!(learning_trends(&rising, 2).trend, Trend::Improving);

        let falling: Vec<_> = rising.iter().rev().cloned().collect();
        assert_eq!(learning_trends(&falling, 2).trend, Trend::Declining);

        let flat: Vec<_> = (0..6).map(|_| evaluation("feature", 3.0)).collect();
        let trends = learning_trends(&flat, 3);
        assert_eq!(trends.trend, Trend::Stable);
        assert_eq!(trends.window_averages, vec![3.0, 3.0]);
    }
}
