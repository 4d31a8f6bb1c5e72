//! Named exclusive locks with stale-holder reclamation.
//!
//! A lock is acquire-or-wait: callers retry with exponential backoff until
//! they get the lock or `max_wait_ms` elapses. A lock held longer than
//! `stale_after_ms` is presumed to belong to a crashed holder and is
//! force-released by the next acquirer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use ulid::Ulid;

use super::{Result, StorageError};

/// Timing parameters shared by every lock implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LockConfig {
    /// Age after which a held lock may be reclaimed
    pub stale_after_ms: u64,
    /// First retry delay
    pub initial_backoff_ms: u64,
    /// Retry delay ceiling
    pub max_backoff_ms: u64,
    /// Give up after waiting this long
    pub max_wait_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
            initial_backoff_ms: 25,
            max_backoff_ms: 500,
            max_wait_ms: 10_000,
        }
    }
}

impl LockConfig {
    fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

/// Proof of holding a named lock. Pass it back to [`NamedLock::release`].
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    token: String,
    acquired_at: chrono::DateTime<Utc>,
}

impl LockGuard {
    /// Lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the lock was acquired.
    pub fn acquired_at(&self) -> chrono::DateTime<Utc> {
        self.acquired_at
    }
}

/// Named mutual-exclusion capability.
#[async_trait]
pub trait NamedLock: Send + Sync {
    /// Acquire `name`, waiting with backoff and reclaiming a stale holder.
    async fn acquire(&self, name: &str) -> Result<LockGuard>;

    /// Release a held lock. Releasing a lock that has since been reclaimed
    /// by someone else is a no-op.
    async fn release(&self, guard: LockGuard) -> Result<()>;
}

/// Exponential backoff bounded by the config's max wait.
struct Backoff {
    started: Instant,
    next: Duration,
    cap: Duration,
    max_wait: Duration,
}

impl Backoff {
    fn new(config: &LockConfig) -> Self {
        Self {
            started: Instant::now(),
            next: Duration::from_millis(config.initial_backoff_ms.max(1)),
            cap: Duration::from_millis(config.max_backoff_ms.max(1)),
            max_wait: Duration::from_millis(config.max_wait_ms),
        }
    }

    /// Sleep before the next attempt, or fail once the maximum wait has passed.
    async fn wait(&mut self, name: &str) -> Result<()> {
        let waited = self.started.elapsed();
        if waited >= self.max_wait {
            return Err(StorageError::LockTimeout {
                name: name.to_string(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        let delay = self.next.min(self.max_wait - waited);
        tokio::time::sleep(delay).await;
        self.next = (self.next * 2).min(self.cap);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockFileBody {
    token: String,
    pid: u32,
    acquired_at: chrono::DateTime<Utc>,
}

/// Cross-process lock backed by exclusively-created files.
///
/// `acquire("hot-swap")` creates `<dir>/hot-swap.lock` with `create_new`,
/// which succeeds for exactly one process at a time.
#[derive(Debug, Clone)]
pub struct FileLock {
    dir: PathBuf,
    config: LockConfig,
}

impl FileLock {
    /// Create a lock manager keeping lock files in `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            config: LockConfig::default(),
        }
    }

    /// Set the timing configuration.
    pub fn with_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", name))
    }

    async fn try_create(&self, path: &Path, body: &LockFileBody) -> Result<bool> {
        let open = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;
        match open {
            Ok(mut file) => {
                file.write_all(&serde_json::to_vec(body)?).await?;
                file.flush().await?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Token and age of the current holder, `None` if the file is gone.
    async fn inspect(&self, path: &Path) -> Result<Option<(Option<String>, Duration)>> {
        let contents = match fs::read(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Ok(body) = serde_json::from_slice::<LockFileBody>(&contents) {
            let age = (Utc::now() - body.acquired_at).to_std().unwrap_or_default();
            return Ok(Some((Some(body.token), age)));
        }

        // Holder has created the file but not written its body yet, or the
        // body is damaged: fall back to the file's mtime.
        let age = match fs::metadata(path).await {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|m| m.elapsed().ok())
                .unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some((None, age)))
    }

    /// Remove the lock at `path` if its holder is stale. Returns whether the
    /// caller should retry immediately.
    async fn reclaim_if_stale(&self, name: &str, path: &Path) -> Result<bool> {
        let (token, age) = match self.inspect(path).await? {
            Some(holder) => holder,
            None => return Ok(true),
        };
        if age <= self.config.stale_after() {
            return Ok(false);
        }

        // Move the file aside first so only one reclaimer wins, then make
        // sure what we moved is the stale lock we inspected.
        let tomb = self
            .dir
            .join(format!("{}.lock.stale-{}", name, Ulid::new()));
        match fs::rename(path, &tomb).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }

        let moved_token = fs::read(&tomb)
            .await
            .ok()
            .and_then(|c| serde_json::from_slice::<LockFileBody>(&c).ok())
            .map(|b| b.token);

        if token.is_some() && moved_token != token {
            // A fresh holder slipped in between inspect and rename: put it back.
            if fs::hard_link(&tomb, path).await.is_err() {
                warn!("Could not restore lock '{}' after a reclaim race", name);
            }
            let _ = fs::remove_file(&tomb).await;
            return Ok(false);
        }

        let _ = fs::remove_file(&tomb).await;
        warn!(
            "Reclaimed stale lock '{}' held for {}ms (holder presumed crashed)",
            name,
            age.as_millis()
        );
        Ok(true)
    }
}

#[async_trait]
impl NamedLock for FileLock {
    async fn acquire(&self, name: &str) -> Result<LockGuard> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path(name);
        let mut backoff = Backoff::new(&self.config);

        loop {
            let body = LockFileBody {
                token: Ulid::new().to_string(),
                pid: std::process::id(),
                acquired_at: Utc::now(),
            };
            if self.try_create(&path, &body).await? {
                debug!("Acquired lock '{}'", name);
                return Ok(LockGuard {
                    name: name.to_string(),
                    token: body.token,
                    acquired_at: body.acquired_at,
                });
            }
            if self.reclaim_if_stale(name, &path).await? {
                continue;
            }
            backoff.wait(name).await?;
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let path = self.lock_path(&guard.name);
        match self.inspect(&path).await? {
            Some((Some(token), _)) if token == guard.token => {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                debug!("Released lock '{}'", guard.name);
            }
            _ => warn!(
                "Lock '{}' was reclaimed by another holder before release",
                guard.name
            ),
        }
        Ok(())
    }
}

/// In-process lock with the same contract as [`FileLock`].
///
/// Only suitable when a single process owns the store.
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
    config: LockConfig,
}

impl MemoryLock {
    /// Create a lock table with default timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timing configuration.
    pub fn with_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether `name` is currently held.
    pub async fn is_held(&self, name: &str) -> bool {
        self.held.lock().await.contains_key(name)
    }
}

#[async_trait]
impl NamedLock for MemoryLock {
    async fn acquire(&self, name: &str) -> Result<LockGuard> {
        let mut backoff = Backoff::new(&self.config);
        loop {
            {
                let mut held = self.held.lock().await;
                let free = match held.get(name) {
                    None => true,
                    Some((_, since)) => {
                        let age = since.elapsed();
                        if age > self.config.stale_after() {
                            warn!(
                                "Reclaimed stale lock '{}' held for {}ms (holder presumed crashed)",
                                name,
                                age.as_millis()
                            );
                            true
                        } else {
                            false
                        }
                    }
                };
                if free {
                    let token = Ulid::new().to_string();
                    held.insert(name.to_string(), (token.clone(), Instant::now()));
                    debug!("Acquired lock '{}'", name);
                    return Ok(LockGuard {
                        name: name.to_string(),
                        token,
                        acquired_at: Utc::now(),
                    });
                }
            }
            backoff.wait(name).await?;
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<()> {
        let mut held = self.held.lock().await;
        match held.get(&guard.name) {
            Some((token, _)) if *token == guard.token => {
                held.remove(&guard.name);
                debug!("Released lock '{}'", guard.name);
            }
            _ => warn!(
                "Lock '{}' was reclaimed by another holder before release",
                guard.name
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> LockConfig {
        LockConfig {
            stale_after_ms: 60_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            max_wait_ms: 100,
        }
    }

    #[tokio::test]
    async fn test_file_lock_acquire_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path()).with_config(quick_config());

        let guard = lock.acquire("hot-swap").await.unwrap();
        assert_eq!(guard.name(), "hot-swap");
        assert!(dir.path().join("hot-swap.lock").exists());

        lock.release(guard).await.unwrap();
        assert!(!dir.path().join("hot-swap.lock").exists());
    }

    #[tokio::test]
    async fn test_file_lock_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path()).with_config(quick_config());

        let guard = lock.acquire("hot-swap").await.unwrap();
        let second = lock.acquire("hot-swap").await;
        assert!(matches!(second, Err(StorageError::LockTimeout { .. })));

        lock.release(guard).await.unwrap();
        let third = lock.acquire("hot-swap").await.unwrap();
        lock.release(third).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_lock_reclaims_stale_holder() {
        let dir = tempfile::tempdir().unwrap();
        let crashed = LockFileBody {
            token: "crashed".to_string(),
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::minutes(10),
        };
        std::fs::write(
            dir.path().join("hot-swap.lock"),
            serde_json::to_vec(&crashed).unwrap(),
        )
        .unwrap();

        let lock = FileLock::new(dir.path()).with_config(quick_config());
        let guard = lock.acquire("hot-swap").await.unwrap();
        assert_ne!(guard.token, "crashed");
        lock.release(guard).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_lock_release_after_reclaim_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path()).with_config(quick_config());
        let old = lock.acquire("hot-swap").await.unwrap();

        // Simulate another process reclaiming and re-acquiring.
        std::fs::remove_file(dir.path().join("hot-swap.lock")).unwrap();
        let newer = lock.acquire("hot-swap").await.unwrap();

        lock.release(old).await.unwrap();
        assert!(dir.path().join("hot-swap.lock").exists());
        lock.release(newer).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_lock_excludes_and_times_out() {
        let lock = MemoryLock::new().with_config(quick_config());
        let guard = lock.acquire("hot-swap").await.unwrap();
        assert!(lock.is_held("hot-swap").await);

        let blocked = lock.acquire("hot-swap").await;
        assert!(matches!(blocked, Err(StorageError::LockTimeout { .. })));

        // Different names do not contend.
        let other = lock.acquire("other").await.unwrap();
        lock.release(other).await.unwrap();

        lock.release(guard).await.unwrap();
        assert!(!lock.is_held("hot-swap").await);
    }

    #[tokio::test]
    async fn test_memory_lock_reclaims_stale_holder() {
        let lock = MemoryLock::new().with_config(LockConfig {
            stale_after_ms: 10,
            ..quick_config()
        });
        let abandoned = lock.acquire("hot-swap").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let guard = lock.acquire("hot-swap").await.unwrap();
        // The abandoned guard no longer owns the lock.
        lock.release(abandoned).await.unwrap();
        assert!(lock.is_held("hot-swap").await);
        lock.release(guard).await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let lock = std::sync::Arc::new(MemoryLock::new().with_config(LockConfig {
            max_wait_ms: 2_000,
            ..quick_config()
        }));
        let guard = lock.acquire("hot-swap").await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let g = lock.acquire("hot-swap").await.unwrap();
                lock.release(g).await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        lock.release(guard).await.unwrap();
        waiter.await.unwrap();
    }
}
