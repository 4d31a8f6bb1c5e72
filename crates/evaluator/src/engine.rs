//! Self evaluator - scores completed tasks and keeps the evaluation log.

use std::sync::Arc;

use kaizen_core::{Evaluation, EvaluationId, Grade, TaskInfo, TaskResult};
use kaizen_storage::{append_capped, read_document, Result, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{
    improvement_suggestions, learning_trends, team_performance, ImprovementReport,
    LearningTrends, TeamPerformance,
};
use crate::scoring::{feedback_for, overall_score, score_dimensions, GOOD_THRESHOLD, SUGGESTION_THRESHOLD};

/// Configuration for the self evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluatorConfig {
    /// Evaluation log document
    pub evaluations_path: String,
    /// Evaluations kept; oldest are dropped first
    pub max_evaluations: usize,
    /// Overall score at or above which feedback is positive
    pub good_threshold: f64,
    /// Default mean below which improvement suggestions flag a dimension
    pub suggestion_threshold: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            evaluations_path: "evaluations.json".to_string(),
            max_evaluations: 500,
            good_threshold: GOOD_THRESHOLD,
            suggestion_threshold: SUGGESTION_THRESHOLD,
        }
    }
}

/// Scores completed tasks without an external judge.
pub struct SelfEvaluator {
    store: Arc<dyn Store>,
    config: EvaluatorConfig,
}

impl SelfEvaluator {
    /// Create a new evaluator over `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: EvaluatorConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Score a completed task. When `persist` is set the evaluation is
    /// appended to the capped log.
    pub async fn evaluate_result(&self, task: &TaskInfo, result: &TaskResult, persist: bool) -> Result<Evaluation> {
        let dimensions = score_dimensions(result);
        let overall = overall_score(&dimensions);
        let evaluation = Evaluation {
            id: EvaluationId::new(),
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            timestamp: chrono::Utc::now(),
            dimensions,
            overall,
            grade: Grade::from_score(overall),
            feedback: feedback_for(&dimensions, overall, self.config.good_threshold),
        };

        if persist {
            let kept = append_capped(
                self.store.as_ref(),
                &self.config.evaluations_path,
                evaluation.clone(),
                self.config.max_evaluations,
            )
            .await?;
            info!(
                "Evaluated task '{}' ({}): {:.2}/5 grade {} [{} in log]",
                task.id, task.task_type, overall, evaluation.grade, kept
            );
        } else {
            debug!("Evaluated task '{}' without persisting: {:.2}/5", task.id, overall);
        }

        Ok(evaluation)
    }

    /// Full evaluation history, oldest first.
    pub async fn history(&self) -> Result<Vec<Evaluation>> {
        Ok(read_document(self.store.as_ref(), &self.config.evaluations_path)
            .await?
            .unwrap_or_default())
    }

    /// The latest `limit` evaluations, most recent first.
    pub async fn get_evaluations(&self, limit: usize) -> Result<Vec<Evaluation>> {
        let history = self.history().await?;
        Ok(history.into_iter().rev().take(limit).collect())
    }

    /// Look up one evaluation.
    pub async fn get_evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        let history = self.history().await?;
        Ok(history.into_iter().find(|e| e.id == id))
    }

    /// Flag weak dimensions and task types among the latest `lookback` evaluations.
    pub async fn get_improvement_suggestions(&self, threshold: f64, lookback: usize) -> Result<ImprovementReport> {
        let history = self.history().await?;
        Ok(improvement_suggestions(&history, threshold, lookback))
    }

    /// Per-task-type averages with the `top_n` best and worst groups.
    pub async fn get_team_performance(&self, top_n: usize) -> Result<TeamPerformance> {
        let history = self.history().await?;
        Ok(team_performance(&history, top_n))
    }

    /// Classify the overall-score trend using windows of `window_size`.
    pub async fn get_learning_trends(&self, window_size: usize) -> Result<LearningTrends> {
        let history = self.history().await?;
        Ok(learning_trends(&history, window_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trend;
    use kaizen_core::{ResultMetrics, UserFeedback};
    use kaizen_storage::MemoryStorage;

    fn evaluator() -> (Arc<MemoryStorage>, SelfEvaluator) {
        let storage = Arc::new(MemoryStorage::new());
        let evaluator = SelfEvaluator::new(storage.clone());
        (storage, evaluator)
    }

    fn good_result() -> TaskResult {
        TaskResult {
            success: true,
            tests_pass: true,
            duration: Some(5_000.0),
            metrics: ResultMetrics {
                user_feedback: Some(UserFeedback::Positive),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_failed_slow_task_grades_low() {
        let (_, evaluator) = evaluator();
        let result: TaskResult =
            serde_json::from_str(r#"{"success": false, "testsPass": false, "duration": 600000}"#).unwrap();
        let evaluation = evaluator
            .evaluate_result(&TaskInfo::new("t1", "feature"), &result, true)
            .await
            .unwrap();

        assert!(evaluation.overall < 2.0);
        assert!(matches!(evaluation.grade, Grade::D | Grade::F));
        assert!((evaluation.dimensions.weight_sum() - 1.0).abs() < 1e-12);
        assert!(evaluation.feedback.contains("Weakest dimension"));
    }

    #[tokio::test]
    async fn test_overall_within_bounds() {
        let (_, evaluator) = evaluator();
        let evaluation = evaluator
            .evaluate_result(&TaskInfo::new("t1", "feature"), &good_result(), false)
            .await
            .unwrap();
        assert!(evaluation.overall >= 1.0 && evaluation.overall <= 5.0);
        assert_eq!(evaluation.grade, Grade::A);
    }

    #[tokio::test]
    async fn test_persist_flag_controls_log() {
        let (storage, evaluator) = evaluator();
        let task = TaskInfo::new("t1", "feature");

        evaluator.evaluate_result(&task, &good_result(), false).await.unwrap();
        assert_eq!(storage.write_count(), 0);
        assert!(evaluator.history().await.unwrap().is_empty());

        let saved = evaluator.evaluate_result(&task, &good_result(), true).await.unwrap();
        assert_eq!(storage.write_count(), 1);
        assert_eq!(evaluator.get_evaluation(saved.id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_log_is_capped_oldest_first() {
        let storage = Arc::new(MemoryStorage::new());
        let evaluator = SelfEvaluator::new(storage).with_config(EvaluatorConfig {
            max_evaluations: 3,
            ..Default::default()
        });

        for i in 0..5 {
            let task = TaskInfo::new(format!("t{}", i), "feature");
            evaluator.evaluate_result(&task, &good_result(), true).await.unwrap();
        }

        let history = evaluator.history().await.unwrap();
        let ids: Vec<_> = history.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);

        let latest = evaluator.get_evaluations(2).await.unwrap();
        assert_eq!(latest[0].task_id, "t4");
        assert_eq!(latest[1].task_id, "t3");
    }

    #[tokio::test]
    async fn test_analytics_read_persisted_history() {
        let (_, evaluator) = evaluator();
        let poor = TaskResult {
            success: false,
            tests_pass: false,
            duration: Some(2_000_000.0),
            metrics: ResultMetrics::default(),
        };
        for i in 0..4 {
            let task = TaskInfo::new(format!("p{}", i), "bugfix");
            evaluator.evaluate_result(&task, &poor, true).await.unwrap();
        }
        for i in 0..4 {
            let task = TaskInfo::new(format!("g{}", i), "feature");
            evaluator.evaluate_result(&task, &good_result(), true).await.unwrap();
        }

        let report = evaluator.get_improvement_suggestions(3.0, 20).await.unwrap();
        assert_eq!(report.sample_size, 8);
        assert!(report.weak_task_types.iter().any(|w| w.name == "bugfix"));

        let perf = evaluator.get_team_performance(1).await.unwrap();
        assert_eq!(perf.top[0].task_type, "feature");
        assert_eq!(perf.bottom[0].task_type, "bugfix");

        let trends = evaluator.get_learning_trends(4).await.unwrap();
        assert_eq!(trends.trend, Trend::Improving);
    }
}
