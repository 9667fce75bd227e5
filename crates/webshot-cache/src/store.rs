//! Cache store unifying the memory and durable tiers

use crate::clock::{Clock, SystemClock};
use crate::disk::{modified_at, remove_if_exists, DiskFile, DiskTier};
use crate::error::Result;
use crate::key::derive_key;
use crate::memory::MemoryTier;
use crate::sweeper::Sweeper;
use crate::types::{
    CacheConfig, CacheEntry, CacheHit, CacheOutcome, CacheStats, CacheTier, Stored, SweepReport,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Two-tier screenshot cache.
///
/// Reads check memory first, then disk; a fresh disk hit is copied into
/// memory. Writes always land in memory and are persisted to disk on a
/// best-effort basis. No operation fails because of a cache fault.
pub struct CacheStore {
    memory: MemoryTier,
    disk: DiskTier,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    sweeper: Mutex<Option<Sweeper>>,
}

impl CacheStore {
    /// Create the store and its cache directory
    pub async fn open(config: CacheConfig) -> Result<Arc<Self>> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let disk = DiskTier::new(config.cache_dir);
        disk.init().await?;

        let ttl = Duration::from_std(config.ttl).unwrap_or(Duration::MAX);

        info!(cache_dir = ?disk.dir(), ttl_secs = ttl.num_seconds(), "Cache initialized");

        Ok(Arc::new(Self {
            memory: MemoryTier::new(config.memory_max_bytes),
            disk,
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - timestamp < self.ttl
    }

    /// Look up a locator. Returns `None` on a miss, on expiry, or on any I/O fault.
    pub async fn get(&self, locator: &str) -> Option<CacheHit> {
        let hit = self.peek(locator).await;
        let counter = if hit.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Same as [`CacheStore::get`] without touching the hit/miss counters
    pub async fn peek(&self, locator: &str) -> Option<CacheHit> {
        let key = derive_key(locator);
        let now = self.clock.now();

        if let Some(entry) = self.memory.get(&key).await {
            if self.is_fresh(entry.timestamp, now) {
                debug!(key = %key, "Memory cache hit");
                return Some(CacheHit {
                    entry,
                    tier: CacheTier::Memory,
                });
            }
            debug!(key = %key, "Memory cache entry expired");
            self.memory.remove(&key).await;
        }

        match self.load_durable(&key, now).await {
            Ok(Some(entry)) => {
                // A set that finished while the disk was being read wins
                let entry = self.memory.insert_if_absent(key.clone(), entry).await;
                debug!(key = %key, "Disk cache hit, promoted to memory");
                return Some(CacheHit {
                    entry,
                    tier: CacheTier::Durable,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to read from disk cache"),
        }

        None
    }

    async fn load_durable(&self, key: &str, now: DateTime<Utc>) -> Result<Option<Arc<CacheEntry>>> {
        let Some(meta) = self.disk.read_metadata(key).await? else {
            return Ok(None);
        };

        if !self.is_fresh(meta.timestamp, now) {
            debug!(key = %key, "Disk cache entry expired, removing");
            self.remove_key(key).await;
            return Ok(None);
        }

        let Some(data) = self.disk.read_payload(key, &meta).await? else {
            debug!(key = %key, "Sidecar present without payload");
            return Ok(None);
        };

        Ok(Some(Arc::new(CacheEntry {
            size: data.len() as u64,
            data: Bytes::from(data),
            content_type: meta.content_type,
            timestamp: meta.timestamp,
            source_locator: meta.url,
        })))
    }

    /// Store an artifact. Memory is always updated; a disk failure yields
    /// `CacheOutcome::Degraded`.
    pub async fn set(&self, locator: &str, data: impl Into<Bytes>, content_type: &str) -> Stored {
        let key = derive_key(locator);
        let data = data.into();
        let entry = Arc::new(CacheEntry {
            size: data.len() as u64,
            data,
            content_type: content_type.to_string(),
            timestamp: self.clock.now(),
            source_locator: locator.to_string(),
        });

        self.memory.insert(key.clone(), entry.clone()).await;

        let outcome = match self.disk.write(&key, &entry).await {
            Ok(()) => CacheOutcome::Complete,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to write to disk cache");
                CacheOutcome::Degraded
            }
        };

        debug!(key = %key, size = entry.size, "Cached entry");
        Stored { entry, outcome }
    }

    /// Remove a locator from both tiers. Missing entries are not an error.
    pub async fn delete(&self, locator: &str) -> CacheOutcome {
        self.remove_key(&derive_key(locator)).await
    }

    async fn remove_key(&self, key: &str) -> CacheOutcome {
        self.memory.remove(key).await;
        match self.disk.remove(key).await {
            Ok(()) => CacheOutcome::Complete,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to delete from disk cache");
                CacheOutcome::Degraded
            }
        }
    }

    /// Empty the memory tier and every file in the cache directory
    pub async fn clear(&self) -> CacheOutcome {
        self.memory.clear().await;
        match self.disk.clear().await {
            Ok(removed) => {
                info!(removed, "Cache cleared");
                CacheOutcome::Complete
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear disk cache");
                CacheOutcome::Degraded
            }
        }
    }

    /// Remove everything older than the TTL from both tiers.
    ///
    /// One unreadable record is counted and skipped; it never stops the pass.
    pub async fn cleanup(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for key in self.memory.expired_keys(now, self.ttl) {
            if !self.remove_key(&key).await.is_complete() {
                report.failures += 1;
            }
            report.memory_expired += 1;
        }

        let files = match self.disk.scan().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Failed to scan disk cache");
                report.failures += 1;
                return report;
            }
        };

        let with_meta: HashSet<&str> = files
            .iter()
            .filter_map(|f| match f {
                DiskFile::Meta { key } => Some(key.as_str()),
                _ => None,
            })
            .collect();

        for file in &files {
            match file {
                DiskFile::Meta { key } => match self.disk.read_metadata(key).await {
                    Ok(Some(meta)) if !self.is_fresh(meta.timestamp, now) => {
                        if self.remove_key(key).await.is_complete() {
                            report.durable_expired += 1;
                        } else {
                            report.failures += 1;
                        }
                    }
                    // Fresh, or removed since the scan
                    Ok(_) => {}
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping unreadable cache metadata");
                        report.failures += 1;
                    }
                },
                DiskFile::Payload { key, path } if !with_meta.contains(key.as_str()) => {
                    self.remove_stale_file(path, now, &mut report).await;
                }
                DiskFile::Temp { path } => {
                    self.remove_stale_file(path, now, &mut report).await;
                }
                DiskFile::Payload { .. } => {}
            }
        }

        report
    }

    async fn remove_stale_file(&self, path: &Path, now: DateTime<Utc>, report: &mut SweepReport) {
        match self.try_remove_stale(path, now).await {
            Ok(true) => {
                debug!(path = ?path, "Removed orphaned cache file");
                report.orphans_removed += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to remove orphaned cache file");
                report.failures += 1;
            }
        }
    }

    async fn try_remove_stale(&self, path: &Path, now: DateTime<Utc>) -> Result<bool> {
        if self.is_fresh(modified_at(path).await?, now) {
            return Ok(false);
        }
        remove_if_exists(path).await?;
        Ok(true)
    }

    /// Point-in-time statistics
    pub async fn stats(&self) -> CacheStats {
        self.memory.sync().await;
        CacheStats {
            memory_entries: self.memory.len(),
            memory_bytes: self.memory.bytes(),
            cache_directory: self.disk.dir().to_path_buf(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Start the periodic expiry sweep. Replaces any sweeper already running.
    pub async fn start_sweeper(self: &Arc<Self>, every: std::time::Duration) {
        let sweeper = Sweeper::spawn(Arc::downgrade(self), every);
        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(sweeper);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    /// Stop the sweeper and wait for an in-progress pass to finish
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
        info!("Cache shut down");
    }

    #[cfg(test)]
    pub(crate) async fn memory_contains(&self, locator: &str) -> bool {
        self.memory.sync().await;
        self.memory.get(&derive_key(locator)).await.is_some()
    }
}
