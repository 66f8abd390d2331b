//! Background sweep of expired cache records.
//!
//! Only the cache backend expires items; the vector store is the durable
//! record and is never swept here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::config::CleanupConfig;
use crate::store::cache::TtlCacheStore;

/// Statistics from a cleanup run.
#[derive(Debug, Clone, Default)]
pub struct CleanupStats {
    /// Number of expired cache records removed.
    pub expired_removed: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Background worker that periodically purges expired cache records.
pub struct BackgroundCleanup {
    cache: Arc<TtlCacheStore>,
    config: CleanupConfig,
    shutdown: Arc<Notify>,
}

impl BackgroundCleanup {
    /// Create a new cleanup worker over the given cache.
    #[must_use]
    pub fn new(cache: Arc<TtlCacheStore>, config: CleanupConfig) -> Self {
        Self {
            cache,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Background cache cleanup is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds);
        info!(?interval, "Starting cache cleanup worker");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let stats = self.run_sweep();
                    if stats.expired_removed > 0 {
                        info!(
                            expired = stats.expired_removed,
                            duration_ms = stats.duration_ms,
                            "Cache sweep completed"
                        );
                    } else {
                        debug!("Cache sweep completed with nothing to remove");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Cache cleanup worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep immediately.
    pub fn run_sweep(&self) -> CleanupStats {
        let start = Instant::now();
        let expired_removed = self.cache.purge_expired();
        CleanupStats {
            expired_removed,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CacheConfig;
    use crate::core::item::MemoryItem;
    use crate::core::kinds::MemoryKind;
    use crate::core::metadata::{KEY_TTL, Metadata};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_sweep_removes_expired_only() {
        let cache = Arc::new(TtlCacheStore::new(&CacheConfig::default()));

        let ephemeral = MemoryItem::new(
            MemoryKind::Conversation,
            "gone soon",
            Metadata::new().with(KEY_TTL, 0),
        )
        .expect("valid item");
        let durable = MemoryItem::new(MemoryKind::Fact, "stays", Metadata::new())
            .expect("valid item");
        cache.store(&ephemeral).await;
        cache.store(&durable).await;

        let worker = BackgroundCleanup::new(Arc::clone(&cache), CleanupConfig::default());
        let stats = worker.run_sweep();
        assert_eq!(stats.expired_removed, 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let cache = Arc::new(TtlCacheStore::new(&CacheConfig::default()));
        let worker = BackgroundCleanup::new(cache, CleanupConfig::default());
        let shutdown = worker.shutdown_notifier();
        let handle = worker.spawn();

        shutdown.notify_one();
        handle.await.expect("worker exits cleanly");
    }
}
