//! Hot-swap engine - moves patterns in and out of the fast tier.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use kaizen_core::{
    ActivePatternDocument, FastTierPattern, LearnedPattern, PatternSourceDocument, PatternStatus, Time,
    TransferAction, TransferLogEntry,
};
use kaizen_storage::{append_capped, read_document, write_document, LockGuard, NamedLock, Result, Store};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::criteria::TransferCriteria;
use crate::report::{
    BelowThreshold, DemotionOutcome, HotSwapReport, PromotionCandidates, PromotionOutcome, TransferStats,
    UsageOutcome,
};

const PROMOTION_SOURCE: &str = "system2";

/// Configuration for knowledge transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
    /// Fast-tier document
    pub active_path: String,
    /// Transfer log document
    pub log_path: String,
    /// Pattern source documents written by external learners
    pub sources: Vec<String>,
    /// Log entries kept; oldest are dropped first
    pub max_log_entries: usize,
    /// Name of the lock guarding writes to the fast tier
    pub lock_name: String,
    /// Promotion and demotion thresholds
    pub criteria: TransferCriteria,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            active_path: "system1-patterns.json".to_string(),
            log_path: "transfer-log.json".to_string(),
            sources: vec!["learned-patterns.json".to_string()],
            max_log_entries: 200,
            lock_name: "hot-swap".to_string(),
            criteria: TransferCriteria::default(),
        }
    }
}

/// Promotes proven patterns into the fast tier and demotes failing ones.
pub struct KnowledgeTransfer {
    store: Arc<dyn Store>,
    lock: Arc<dyn NamedLock>,
    config: TransferConfig,
    cache: Mutex<Option<ActivePatternDocument>>,
}

impl KnowledgeTransfer {
    /// Create a new engine over `store`, serializing fast-tier writes with `lock`.
    pub fn new(store: Arc<dyn Store>, lock: Arc<dyn NamedLock>) -> Self {
        Self {
            store,
            lock,
            config: TransferConfig::default(),
            cache: Mutex::new(None),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: TransferConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    async fn load_active(&self) -> Result<ActivePatternDocument> {
        Ok(read_document(self.store.as_ref(), &self.config.active_path)
            .await?
            .unwrap_or_default())
    }

    async fn cached_active(&self) -> Result<ActivePatternDocument> {
        let mut cache = self.cache.lock().await;
        if let Some(document) = cache.as_ref() {
            return Ok(document.clone());
        }
        let document = self.load_active().await?;
        *cache = Some(document.clone());
        Ok(document)
    }

    async fn save_active(&self, mut document: ActivePatternDocument, now: Time) -> Result<()> {
        document.updated_at = Some(now);
        write_document(self.store.as_ref(), &self.config.active_path, &document).await?;
        *self.cache.lock().await = Some(document);
        Ok(())
    }

    async fn log(&self, entry: TransferLogEntry) -> Result<()> {
        append_capped(
            self.store.as_ref(),
            &self.config.log_path,
            entry,
            self.config.max_log_entries,
        )
        .await?;
        Ok(())
    }

    /// Source patterns across every configured document, one per key
    /// (highest confidence wins).
    async fn load_sources(&self) -> Result<Vec<LearnedPattern>> {
        let mut by_key: BTreeMap<String, LearnedPattern> = BTreeMap::new();
        for path in &self.config.sources {
            let Some(source) = read_document::<_, PatternSourceDocument>(self.store.as_ref(), path).await? else {
                debug!("Pattern source '{}' not found, skipping", path);
                continue;
            };
            for pattern in source.patterns() {
                if pattern.key.trim().is_empty() {
                    debug!("Skipping keyless pattern in '{}'", path);
                    continue;
                }
                match by_key.get(&pattern.key) {
                    Some(existing) if existing.confidence >= pattern.confidence => {}
                    _ => {
                        by_key.insert(pattern.key.clone(), pattern);
                    }
                }
            }
        }
        Ok(by_key.into_values().collect())
    }

    /// Move `pattern` into the fast tier if it meets the promotion bar.
    ///
    /// Re-promoting an active key bumps its promotion count and keeps its
    /// usage history. The write runs under the named lock, so it cannot be
    /// lost to a concurrent `hot_swap`.
    pub async fn promote_to_system1(&self, pattern: &LearnedPattern) -> Result<PromotionOutcome> {
        if let Some(reason) = self.config.criteria.promotion_rejection(pattern) {
            debug!("Promotion of '{}' rejected: {}", pattern.key, reason);
            return Ok(PromotionOutcome::rejected(&pattern.key, reason));
        }

        let guard = self.lock.acquire(&self.config.lock_name).await?;
        let outcome = self.promote_locked(pattern).await;
        self.release(guard, outcome).await
    }

    async fn promote_locked(&self, pattern: &LearnedPattern) -> Result<PromotionOutcome> {
        let now = chrono::Utc::now();
        let mut document = self.load_active().await?;
        let promoted = promote_into(&mut document, pattern, now);
        self.save_active(document, now).await?;

        let reason = format!(
            "confidence {:.2} after {} consecutive successes",
            pattern.confidence, pattern.consecutive_successes
        );
        self.log(TransferLogEntry::single(TransferAction::Promote, &pattern.key, &reason))
            .await?;
        info!(
            "Promoted '{}' to the fast tier (promotion #{})",
            pattern.key, promoted.promotion_count
        );

        Ok(PromotionOutcome {
            promoted: true,
            key: pattern.key.clone(),
            reason,
            pattern: Some(promoted),
        })
    }

    /// Remove `key` from the fast tier. Runs under the named lock.
    pub async fn demote_from_system1(&self, key: &str, reason: &str) -> Result<DemotionOutcome> {
        let guard = self.lock.acquire(&self.config.lock_name).await?;
        let outcome = self.demote_locked(key, reason).await;
        self.release(guard, outcome).await
    }

    async fn demote_locked(&self, key: &str, reason: &str) -> Result<DemotionOutcome> {
        let mut document = self.load_active().await?;
        let before = document.patterns.len();
        document.patterns.retain(|p| p.key != key);
        if document.patterns.len() == before {
            return Ok(DemotionOutcome {
                demoted: false,
                key: key.to_string(),
                reason: format!("pattern '{}' is not active", key),
            });
        }

        self.save_active(document, chrono::Utc::now()).await?;
        self.log(TransferLogEntry::single(TransferAction::Demote, key, reason))
            .await?;
        info!("Demoted '{}' from the fast tier: {}", key, reason);

        Ok(DemotionOutcome {
            demoted: true,
            key: key.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Record one use of an active pattern, demoting it when it keeps failing.
    /// Runs under the named lock.
    pub async fn record_system1_usage(&self, key: &str, success: bool) -> Result<UsageOutcome> {
        let guard = self.lock.acquire(&self.config.lock_name).await?;
        let outcome = self.record_usage_locked(key, success).await;
        self.release(guard, outcome).await
    }

    async fn record_usage_locked(&self, key: &str, success: bool) -> Result<UsageOutcome> {
        let now = chrono::Utc::now();
        let mut document = self.load_active().await?;
        let Some(index) = document.patterns.iter().position(|p| p.key == key) else {
            return Ok(UsageOutcome {
                updated: false,
                auto_demoted: false,
                reason: Some(format!("pattern '{}' is not active", key)),
                pattern: None,
            });
        };

        let pattern = &mut document.patterns[index];
        pattern.usage_count += 1;
        pattern.last_used_at = Some(now);
        if success {
            pattern.consecutive_failures = 0;
            pattern.last_success_at = Some(now);
        } else {
            pattern.failure_count += 1;
            pattern.consecutive_failures += 1;
        }
        let updated = pattern.clone();

        let Some(demotion) = self.config.criteria.demotion_reason(&updated) else {
            self.save_active(document, now).await?;
            debug!(
                "Recorded {} for '{}' ({} uses, {} failures)",
                if success { "success" } else { "failure" },
                key,
                updated.usage_count,
                updated.failure_count
            );
            return Ok(UsageOutcome {
                updated: true,
                auto_demoted: false,
                reason: None,
                pattern: Some(updated),
            });
        };

        document.patterns.remove(index);
        self.save_active(document, now).await?;
        let reason = demotion.to_string();
        self.log(TransferLogEntry::single(TransferAction::AutoDemote, key, &reason))
            .await?;
        warn!("Auto-demoted '{}' from the fast tier: {}", key, reason);

        Ok(UsageOutcome {
            updated: true,
            auto_demoted: true,
            reason: Some(reason),
            pattern: Some(updated),
        })
    }

    /// Reconcile the fast tier with the pattern sources under the named lock.
    ///
    /// The lock is released whether or not the pass succeeds.
    pub async fn hot_swap(&self) -> Result<HotSwapReport> {
        let guard = self.lock.acquire(&self.config.lock_name).await?;
        let outcome = self.hot_swap_locked().await;
        *self.cache.lock().await = None;
        self.release(guard, outcome).await
    }

    /// Release `guard`, then surface the first failure.
    async fn release<T>(&self, guard: LockGuard, outcome: Result<T>) -> Result<T> {
        let released = self.lock.release(guard).await;
        let value = outcome?;
        released?;
        Ok(value)
    }

    async fn hot_swap_locked(&self) -> Result<HotSwapReport> {
        let now = chrono::Utc::now();
        let sources = self.load_sources().await?;
        let mut document = self.load_active().await?;
        let criteria = &self.config.criteria;

        let mut demoted = Vec::new();
        document.patterns.retain(|p| match criteria.demotion_reason(p) {
            Some(reason) => {
                debug!("Hot-swap demoting '{}': {}", p.key, reason);
                demoted.push(p.key.clone());
                false
            }
            None => true,
        });
        let unchanged = document.patterns.len();

        let active: HashSet<String> = document.patterns.iter().map(|p| p.key.clone()).collect();
        let demoted_keys: HashSet<&str> = demoted.iter().map(String::as_str).collect();
        let mut promoted = Vec::new();
        for pattern in &sources {
            if active.contains(&pattern.key) || demoted_keys.contains(pattern.key.as_str()) {
                continue;
            }
            if criteria.is_promotable(pattern) {
                promote_into(&mut document, pattern, now);
                promoted.push(pattern.key.clone());
            }
        }

        let report = HotSwapReport {
            promoted,
            demoted,
            unchanged,
            timestamp: now,
        };

        if report.changed() {
            self.save_active(document, now).await?;
            self.log(TransferLogEntry::hot_swap(report.promoted.clone(), report.demoted.clone()))
                .await?;
            info!(
                "Hot-swap promoted {} and demoted {} pattern(s), {} unchanged",
                report.promoted.len(),
                report.demoted.len(),
                report.unchanged
            );
        } else {
            debug!("Hot-swap found nothing to change ({} active)", unchanged);
        }

        Ok(report)
    }

    /// Source patterns grouped into eligible, already active and not yet eligible.
    pub async fn get_promotion_candidates(&self) -> Result<PromotionCandidates> {
        let sources = self.load_sources().await?;
        let active: HashSet<String> = self
            .cached_active()
            .await?
            .patterns
            .into_iter()
            .map(|p| p.key)
            .collect();
        let criteria = &self.config.criteria;

        let mut report = PromotionCandidates::default();
        for pattern in sources {
            if active.contains(&pattern.key) {
                report.already_promoted.push(pattern.key);
            } else if criteria.is_promotable(&pattern) {
                report.candidates.push(pattern);
            } else {
                report.below_threshold.push(BelowThreshold {
                    confidence_gap: criteria.confidence_gap(&pattern),
                    successes_gap: criteria.successes_gap(&pattern),
                    pattern,
                });
            }
        }
        report
            .candidates
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(report)
    }

    /// Every active pattern.
    pub async fn get_system1_patterns(&self) -> Result<Vec<FastTierPattern>> {
        Ok(self.cached_active().await?.patterns)
    }

    /// One active pattern.
    pub async fn get_system1_pattern(&self, key: &str) -> Result<Option<FastTierPattern>> {
        Ok(self
            .cached_active()
            .await?
            .patterns
            .into_iter()
            .find(|p| p.key == key))
    }

    /// The latest `limit` log entries, most recent first, optionally of one action.
    pub async fn get_transfer_history(
        &self,
        limit: usize,
        action: Option<TransferAction>,
    ) -> Result<Vec<TransferLogEntry>> {
        let log: Vec<TransferLogEntry> = read_document(self.store.as_ref(), &self.config.log_path)
            .await?
            .unwrap_or_default();
        Ok(log
            .into_iter()
            .rev()
            .filter(|e| action.map_or(true, |a| e.action == a))
            .take(limit)
            .collect())
    }

    /// Counts over the active set and the retained transfer log.
    pub async fn get_transfer_stats(&self) -> Result<TransferStats> {
        let document = self.cached_active().await?;
        let log: Vec<TransferLogEntry> = read_document(self.store.as_ref(), &self.config.log_path)
            .await?
            .unwrap_or_default();

        let mut stats = TransferStats {
            active_count: document.patterns.len(),
            updated_at: document.updated_at,
            ..Default::default()
        };
        for entry in &log {
            match entry.action {
                TransferAction::Promote => stats.total_promotions += 1,
                TransferAction::Demote => stats.total_demotions += 1,
                TransferAction::AutoDemote => {
                    stats.total_demotions += 1;
                    stats.auto_demotions += 1;
                }
                TransferAction::HotSwap => {
                    stats.hot_swaps += 1;
                    stats.total_promotions += entry.promoted.len();
                    stats.total_demotions += entry.demoted.len();
                }
            }
        }
        if !document.patterns.is_empty() {
            let n = document.patterns.len() as f64;
            stats.mean_confidence = document.patterns.iter().map(|p| p.confidence).sum::<f64>() / n;
            stats.mean_usage = document.patterns.iter().map(|p| p.usage_count as f64).sum::<f64>() / n;
        }
        Ok(stats)
    }

    /// Drop the cached active set so the next read goes to the store.
    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }
}

/// Insert or refresh `pattern` in the active set.
fn promote_into(document: &mut ActivePatternDocument, pattern: &LearnedPattern, now: Time) -> FastTierPattern {
    let existing = document.patterns.iter().position(|p| p.key == pattern.key);
    let previous = existing.map(|i| document.patterns[i].clone());

    let promoted = FastTierPattern {
        key: pattern.key.clone(),
        pattern_type: pattern.pattern_type.clone(),
        category: pattern.category.clone(),
        confidence: pattern.confidence,
        status: PatternStatus::Active,
        promotion_count: previous.as_ref().map_or(0, |p| p.promotion_count) + 1,
        usage_count: previous.as_ref().map_or(0, |p| p.usage_count),
        failure_count: previous.as_ref().map_or(0, |p| p.failure_count),
        consecutive_failures: 0,
        source: PROMOTION_SOURCE.to_string(),
        insight: pattern.insight.clone(),
        promoted_at: now,
        last_used_at: previous.as_ref().and_then(|p| p.last_used_at),
        last_success_at: previous.as_ref().and_then(|p| p.last_success_at),
    };

    match existing {
        Some(i) => document.patterns[i] = promoted.clone(),
        None => document.patterns.push(promoted.clone()),
    }
    promoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use kaizen_storage::{MemoryLock, MemoryStorage, StorageError};
    use serde_json::json;
    use tokio::sync::Notify;

    fn engine() -> (Arc<MemoryStorage>, Arc<MemoryLock>, KnowledgeTransfer) {
        let storage = Arc::new(MemoryStorage::new());
        let lock = Arc::new(MemoryLock::new());
        let engine = KnowledgeTransfer::new(storage.clone(), lock.clone());
        (storage, lock, engine)
    }

    async fn seed_sources(storage: &MemoryStorage, categories: serde_json::Value) {
        storage
            .write("learned-patterns.json", &json!({ "categories": categories }))
            .await
            .unwrap();
    }

    async fn seed_active(storage: &MemoryStorage, patterns: serde_json::Value) {
        storage
            .write("system1-patterns.json", &json!({ "patterns": patterns }))
            .await
            .unwrap();
    }

    fn active_json(key: &str, usage: u64, failures: u64, consecutive: u64) -> serde_json::Value {
        json!({
            "key": key,
            "confidence": 0.9,
            "status": "active",
            "promotionCount": 1,
            "usageCount": usage,
            "failureCount": failures,
            "consecutiveFailures": consecutive,
            "source": "system2",
            "promotedAt": "2026-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_promote_then_auto_demote_on_consecutive_failures() {
        let (_, _, engine) = engine();
        let outcome = engine
            .promote_to_system1(&LearnedPattern::new("k", 0.9, 5))
            .await
            .unwrap();
        assert!(outcome.promoted);
        let pattern = outcome.pattern.unwrap();
        assert_eq!(pattern.source, "system2");
        assert_eq!(pattern.promotion_count, 1);

        let first = engine.record_system1_usage("k", false).await.unwrap();
        assert!(first.updated);
        assert!(!first.auto_demoted);

        let second = engine.record_system1_usage("k", false).await.unwrap();
        assert!(second.auto_demoted);
        assert!(second.reason.unwrap().contains("consecutive failures"));
        assert!(engine.get_system1_pattern("k").await.unwrap().is_none());

        let history = engine.get_transfer_history(50, None).await.unwrap();
        assert_eq!(history[0].action, TransferAction::AutoDemote);
        assert_eq!(history[1].action, TransferAction::Promote);
    }

    #[tokio::test]
    async fn test_promotion_rejections_are_not_errors() {
        let (storage, _, engine) = engine();
        let at_threshold = engine
            .promote_to_system1(&LearnedPattern::new("k", 0.8, 10))
            .await
            .unwrap();
        assert!(!at_threshold.promoted);

        let missing_key = engine
            .promote_to_system1(&LearnedPattern::new("", 0.99, 10))
            .await
            .unwrap();
        assert!(!missing_key.promoted);
        assert!(missing_key.reason.contains("key"));
        assert_eq!(storage.write_count(), 0);

        let exactly_three = engine
            .promote_to_system1(&LearnedPattern::new("k", 0.81, 3))
            .await
            .unwrap();
        assert!(exactly_three.promoted);
    }

    #[tokio::test]
    async fn test_repromotion_preserves_usage() {
        let (_, _, engine) = engine();
        let pattern = LearnedPattern::new("k", 0.9, 5);
        engine.promote_to_system1(&pattern).await.unwrap();
        engine.record_system1_usage("k", true).await.unwrap();
        engine.record_system1_usage("k", false).await.unwrap();

        let again = engine.promote_to_system1(&pattern).await.unwrap().pattern.unwrap();
        assert_eq!(again.promotion_count, 2);
        assert_eq!(again.usage_count, 2);
        assert_eq!(again.failure_count, 1);
        assert_eq!(again.consecutive_failures, 0);
        assert_eq!(engine.get_system1_patterns().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_below_error_rate_floor_stays_active() {
        let (storage, _, engine) = engine();
        seed_active(&storage, json!([active_json("k", 3, 2, 0)])).await;

        // 4 uses, 3 failures: error rate counts only from 5 uses.
        let outcome = engine.record_system1_usage("k", false).await.unwrap();
        assert!(outcome.updated);
        assert!(!outcome.auto_demoted);
        assert_eq!(outcome.pattern.unwrap().usage_count, 4);

        let success = engine.record_system1_usage("k", true).await.unwrap();
        assert!(success.auto_demoted);
        assert!(success.reason.unwrap().contains("error rate"));
    }

    #[tokio::test]
    async fn test_usage_and_demotion_of_unknown_key() {
        let (_, _, engine) = engine();
        let usage = engine.record_system1_usage("nope", true).await.unwrap();
        assert!(!usage.updated);
        assert!(usage.reason.is_some());

        let demotion = engine.demote_from_system1("nope", "manual").await.unwrap();
        assert!(!demotion.demoted);
    }

    #[tokio::test]
    async fn test_manual_demotion_removes_entry() {
        let (_, _, engine) = engine();
        engine
            .promote_to_system1(&LearnedPattern::new("k", 0.9, 5))
            .await
            .unwrap();
        let outcome = engine.demote_from_system1("k", "superseded").await.unwrap();
        assert!(outcome.demoted);
        assert!(engine.get_system1_patterns().await.unwrap().is_empty());

        let demotes = engine
            .get_transfer_history(50, Some(TransferAction::Demote))
            .await
            .unwrap();
        assert_eq!(demotes.len(), 1);
        assert_eq!(demotes[0].reason, "superseded");
    }

    #[tokio::test]
    async fn test_hot_swap_demotes_high_error_rate() {
        let (storage, lock, engine) = engine();
        seed_active(
            &storage,
            json!([active_json("bad", 10, 4, 0), active_json("good", 10, 1, 0)]),
        )
        .await;

        let report = engine.hot_swap().await.unwrap();
        assert_eq!(report.demoted, vec!["bad"]);
        assert!(report.promoted.is_empty());
        assert_eq!(report.unchanged, 1);
        assert!(!lock.is_held("hot-swap").await);

        let history = engine
            .get_transfer_history(50, Some(TransferAction::HotSwap))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].demoted, vec!["bad"]);
    }

    #[tokio::test]
    async fn test_hot_swap_promotes_deduplicated_sources() {
        let (storage, _, engine) = engine();
        seed_sources(
            &storage,
            json!({
                "routing": [
                    {"key": "a", "confidence": 0.85, "consecutiveSuccesses": 4},
                    {"key": "weak", "confidence": 0.6, "consecutiveSuccesses": 1}
                ],
                "testing": [
                    {"key": "a", "confidence": 0.95, "consecutiveSuccesses": 6}
                ]
            }),
        )
        .await;

        let report = engine.hot_swap().await.unwrap();
        assert_eq!(report.promoted, vec!["a"]);
        let active = engine.get_system1_pattern("a").await.unwrap().unwrap();
        assert_eq!(active.confidence, 0.95);
        assert_eq!(active.category, "testing");

        let candidates = engine.get_promotion_candidates().await.unwrap();
        assert_eq!(candidates.already_promoted, vec!["a"]);
        assert!(candidates.candidates.is_empty());
        assert_eq!(candidates.below_threshold.len(), 1);
        assert_eq!(candidates.below_threshold[0].successes_gap, 2);
    }

    #[tokio::test]
    async fn test_hot_swap_without_changes_writes_nothing() {
        let (storage, _, engine) = engine();
        seed_active(&storage, json!([active_json("good", 10, 1, 0)])).await;
        let writes = storage.write_count();

        let report = engine.hot_swap().await.unwrap();
        assert!(report.promoted.is_empty());
        assert!(report.demoted.is_empty());
        assert_eq!(report.unchanged, 1);
        assert_eq!(storage.write_count(), writes);
        assert!(engine.get_transfer_history(50, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hot_swap_times_out_when_lock_held() {
        let storage = Arc::new(MemoryStorage::new());
        let lock = Arc::new(MemoryLock::new().with_config(kaizen_storage::LockConfig {
            max_wait_ms: 50,
            ..Default::default()
        }));
        let engine = KnowledgeTransfer::new(storage, lock.clone());

        let held = lock.acquire("hot-swap").await.unwrap();
        let err = engine.hot_swap().await.unwrap_err();
        assert!(matches!(err, StorageError::LockTimeout { .. }));
        lock.release(held).await.unwrap();
        assert!(engine.hot_swap().await.is_ok());
    }

    #[tokio::test]
    async fn test_hot_swap_releases_lock_on_error() {
        let (storage, lock, engine) = engine();
        storage
            .write("learned-patterns.json", &json!({"categories": {"x": "not a list"}}))
            .await
            .unwrap();

        assert!(engine.hot_swap().await.is_err());
        assert!(!lock.is_held("hot-swap").await);
    }

    /// Store that parks the first read of the active set until resumed.
    struct PausingStore {
        inner: Arc<MemoryStorage>,
        armed: AtomicBool,
        reached: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl Store for PausingStore {
        async fn read(&self, path: &str) -> Result<Option<serde_json::Value>> {
            if path == "system1-patterns.json" && self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            self.inner.read(path).await
        }

        async fn write(&self, path: &str, value: &serde_json::Value) -> Result<()> {
            self.inner.write(path, value).await
        }
    }

    #[tokio::test]
    async fn test_promotion_waits_for_running_hot_swap() {
        let storage = Arc::new(MemoryStorage::new());
        seed_active(&storage, json!([active_json("bad", 10, 4, 0)])).await;
        let pausing = Arc::new(PausingStore {
            inner: storage.clone(),
            armed: AtomicBool::new(true),
            reached: Notify::new(),
            resume: Notify::new(),
        });
        let lock = Arc::new(MemoryLock::new());
        let swapper = Arc::new(KnowledgeTransfer::new(pausing.clone(), lock.clone()));
        let promoter = Arc::new(KnowledgeTransfer::new(storage.clone(), lock.clone()));

        let swap = tokio::spawn({
            let swapper = swapper.clone();
            async move { swapper.hot_swap().await }
        });
        pausing.reached.notified().await;

        let promotion = tokio::spawn({
            let promoter = promoter.clone();
            async move {
                promoter
                    .promote_to_system1(&LearnedPattern::new("fresh", 0.95, 5))
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!promotion.is_finished());

        pausing.resume.notify_one();
        let report = swap.await.unwrap().unwrap();
        assert_eq!(report.demoted, vec!["bad"]);
        assert!(promotion.await.unwrap().unwrap().promoted);

        promoter.clear_cache().await;
        let active = promoter.get_system1_patterns().await.unwrap();
        let keys: Vec<&str> = active.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["fresh"]);
        assert!(!lock.is_held("hot-swap").await);
    }

    #[tokio::test]
    async fn test_usage_and_demotion_time_out_when_lock_held() {
        let storage = Arc::new(MemoryStorage::new());
        seed_active(&storage, json!([active_json("k", 1, 0, 0)])).await;
        let lock = Arc::new(MemoryLock::new().with_config(kaizen_storage::LockConfig {
            max_wait_ms: 50,
            ..Default::default()
        }));
        let engine = KnowledgeTransfer::new(storage.clone(), lock.clone());

        let held = lock.acquire("hot-swap").await.unwrap();
        let writes = storage.write_count();
        let usage = engine.record_system1_usage("k", true).await.unwrap_err();
        assert!(matches!(usage, StorageError::LockTimeout { .. }));
        let demotion = engine.demote_from_system1("k", "manual").await.unwrap_err();
        assert!(matches!(demotion, StorageError::LockTimeout { .. }));
        let promotion = engine
            .promote_to_system1(&LearnedPattern::new("p", 0.9, 5))
            .await
            .unwrap_err();
        assert!(matches!(promotion, StorageError::LockTimeout { .. }));
        assert_eq!(storage.write_count(), writes);

        lock.release(held).await.unwrap();
        assert!(engine.record_system1_usage("k", true).await.unwrap().updated);
        assert!(!lock.is_held("hot-swap").await);
    }

    #[tokio::test]
    async fn test_keyless_source_patterns_are_ignored() {
        let (storage, _, engine) = engine();
        seed_sources(
            &storage,
            json!({
                "routing": [
                    {"confidence": 0.99, "consecutiveSuccesses": 9},
                    {"key": "  ", "confidence": 0.4, "consecutiveSuccesses": 0},
                    {"key": "ok", "confidence": 0.9, "consecutiveSuccesses": 4}
                ]
            }),
        )
        .await;

        let candidates = engine.get_promotion_candidates().await.unwrap();
        let keys: Vec<&str> = candidates.candidates.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["ok"]);
        assert!(candidates.already_promoted.is_empty());
        assert!(candidates.below_threshold.is_empty());

        let report = engine.hot_swap().await.unwrap();
        assert_eq!(report.promoted, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_extreme_success_counts_do_not_overflow_gap() {
        let (storage, _, engine) = engine();
        seed_sources(
            &storage,
            json!({
                "routing": [
                    {"key": "neg", "confidence": 0.5, "consecutiveSuccesses": -1e30}
                ]
            }),
        )
        .await;

        let candidates = engine.get_promotion_candidates().await.unwrap();
        assert_eq!(candidates.below_threshold.len(), 1);
        assert!(candidates.below_threshold[0].successes_gap > 3);
    }

    #[tokio::test]
    async fn test_cache_is_refreshed_after_clear() {
        let (storage, _, engine) = engine();
        assert!(engine.get_system1_patterns().await.unwrap().is_empty());

        seed_active(&storage, json!([active_json("external", 1, 0, 0)])).await;
        assert!(engine.get_system1_patterns().await.unwrap().is_empty());

        engine.clear_cache().await;
        assert_eq!(engine.get_system1_patterns().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_stats() {
        let (storage, _, engine) = engine();
        seed_active(&storage, json!([active_json("bad", 10, 5, 0)])).await;
        engine
            .promote_to_system1(&LearnedPattern::new("k", 0.9, 5))
            .await
            .unwrap();
        engine.hot_swap().await.unwrap();
        engine.record_system1_usage("k", true).await.unwrap();

        let stats = engine.get_transfer_stats().await.unwrap();
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.total_promotions, 1);
        assert_eq!(stats.total_demotions, 1);
        assert_eq!(stats.hot_swaps, 1);
        assert_eq!(stats.mean_usage, 1.0);
        assert!((stats.mean_confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_log_is_capped() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = KnowledgeTransfer::new(storage, Arc::new(MemoryLock::new())).with_config(TransferConfig {
            max_log_entries: 2,
            ..Default::default()
        });
        for i in 0..4 {
            engine
                .promote_to_system1(&LearnedPattern::new(format!("k{}", i), 0.9, 5))
                .await
                .unwrap();
        }
        let history = engine.get_transfer_history(50, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].key.as_deref(), Some("k3"));
    }
}
