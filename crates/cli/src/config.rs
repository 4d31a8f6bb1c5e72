//! Optional `kaizen.json` settings file.

use std::path::Path;

use anyhow::{Context, Result};
use kaizen_evaluator::EvaluatorConfig;
use kaizen_grpo::GrpoConfig;
use kaizen_storage::LockConfig;
use kaizen_transfer::TransferConfig;
use serde::{Deserialize, Serialize};

/// Settings file name inside the data directory.
pub const CONFIG_FILE: &str = "kaizen.json";

/// Per-engine settings. Missing sections use defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KaizenConfig {
    /// Self evaluator log and thresholds
    pub evaluator: EvaluatorConfig,
    /// GRPO weight documents and learning rate
    pub grpo: GrpoConfig,
    /// Fast-tier documents and promotion criteria
    pub transfer: TransferConfig,
    /// Backoff and staleness of the named file lock
    pub lock: LockConfig,
}

impl KaizenConfig {
    /// Load `kaizen.json` from `data_dir`, or defaults when absent.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Invalid settings in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Threshold for improvement suggestions; `flag` wins over the settings file.
    pub fn suggestion_threshold(&self, flag: Option<f64>) -> f64 {
        flag.unwrap_or(self.evaluator.suggestion_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KaizenConfig::load(dir.path()).await.unwrap();
        assert_eq!(config, KaizenConfig::default());
    }

    #[tokio::test]
    async fn test_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"grpo": {"learningRate": 0.25}, "transfer": {"criteria": {"minConfidence": 0.9}}}"#,
        )
        .await
        .unwrap();

        let config = KaizenConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.grpo.learning_rate, 0.25);
        assert_eq!(config.grpo.max_rounds, 200);
        assert_eq!(config.transfer.criteria.min_confidence, 0.9);
        assert_eq!(config.transfer.criteria.min_consecutive_successes, 3);
        assert_eq!(config.evaluator, EvaluatorConfig::default());
    }

    #[tokio::test]
    async fn test_suggestion_threshold_defaults_and_overrides() {
        let defaults = KaizenConfig::default();
        assert_eq!(defaults.suggestion_threshold(None), 3.0);
        assert_eq!(defaults.suggestion_threshold(Some(2.5)), 2.5);

        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"evaluator": {"suggestionThreshold": 3.25}}"#,
        )
        .await
        .unwrap();
        let config = KaizenConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.suggestion_threshold(None), 3.25);
        assert_eq!(config.evaluator.good_threshold, 3.5);
        assert_eq!(config.suggestion_threshold(Some(4.0)), 4.0);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(CONFIG_FILE), "{not json").await.unwrap();
        assert!(KaizenConfig::load(dir.path()).await.is_err());
    }
}
