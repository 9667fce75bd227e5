//! Cache types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A cached artifact
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Bytes,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
    /// Locator the entry was stored under, kept for diagnostics
    pub source_locator: String,
    pub size: u64,
}

/// Metadata sidecar persisted next to each payload file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub content_type: String,
    pub size: u64,
}

impl From<&CacheEntry> for EntryMetadata {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            url: entry.source_locator.clone(),
            timestamp: entry.timestamp,
            content_type: entry.content_type.clone(),
            size: entry.size,
        }
    }
}

/// Which tier served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Durable,
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: Arc<CacheEntry>,
    pub tier: CacheTier,
}

/// Result of a mutating store operation.
///
/// `Degraded` means the memory tier was updated but the durable tier could
/// not be; the failure has already been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Complete,
    Degraded,
}

impl CacheOutcome {
    pub fn is_complete(self) -> bool {
        self == CacheOutcome::Complete
    }
}

/// Result of `CacheStore::set`
#[derive(Debug, Clone)]
pub struct Stored {
    pub entry: Arc<CacheEntry>,
    pub outcome: CacheOutcome,
}

/// Counts from one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Keys removed because their memory-tier copy expired
    pub memory_expired: usize,
    /// Keys removed because their durable sidecar expired
    pub durable_expired: usize,
    /// Stale payload or temp files with no usable sidecar
    pub orphans_removed: usize,
    /// Records that could not be read or removed
    pub failures: usize,
}

/// Point-in-time statistics. Informational only.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub cache_directory: PathBuf,
    pub hits: u64,
    pub misses: u64,
}

/// Configuration for a `CacheStore`
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub ttl: Duration,
    /// Upper bound on bytes held by the memory tier; 0 disables the bound
    pub memory_max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./.cache/screenshots"),
            ttl: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            memory_max_bytes: 256 * 1024 * 1024,         // 256MB
        }
    }
}
