//! Process-local memory tier

use crate::types::CacheEntry;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::sync::Arc;
use tracing::debug;

/// Key → entry map with an optional byte bound and LRU eviction.
///
/// Expiry is not delegated to moka: entries carry their own timestamp and
/// the store checks it against its clock.
pub(crate) struct MemoryTier {
    cache: Cache<String, Arc<CacheEntry>>,
    max_bytes: u64,
}

fn weight(entry: &CacheEntry) -> u32 {
    u32::try_from(entry.size).unwrap_or(u32::MAX)
}

impl MemoryTier {
    pub fn new(max_bytes: u64) -> Self {
        let builder = Cache::builder()
            .weigher(|_key: &String, entry: &Arc<CacheEntry>| weight(entry))
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key, _entry, cause| {
                if cause.was_evicted() {
                    debug!(key = %key, "Evicted least recently used memory entry");
                }
            });
        let cache = if max_bytes > 0 {
            builder.max_capacity(max_bytes).build()
        } else {
            builder.build()
        };
        Self { cache, max_bytes }
    }

    fn fits(&self, key: &str, entry: &CacheEntry) -> bool {
        if self.max_bytes > 0 && entry.size > self.max_bytes {
            debug!(
                key = %key,
                size = entry.size,
                max_bytes = self.max_bytes,
                "Entry too large for memory tier"
            );
            return false;
        }
        true
    }

    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.cache.get(key).await
    }

    /// Insert or overwrite. Returns false if the entry alone exceeds the bound
    /// and was therefore not stored.
    pub async fn insert(&self, key: String, entry: Arc<CacheEntry>) -> bool {
        if !self.fits(&key, &entry) {
            self.cache.invalidate(&key).await;
            return false;
        }
        self.cache.insert(key, entry).await;
        true
    }

    /// Insert only when the key is vacant. Returns whichever entry the tier
    /// holds afterwards, so a write that landed first wins.
    pub async fn insert_if_absent(&self, key: String, entry: Arc<CacheEntry>) -> Arc<CacheEntry> {
        if !self.fits(&key, &entry) {
            return self.cache.get(&key).await.unwrap_or(entry);
        }
        self.cache.entry(key).or_insert(entry).await.into_value()
    }

    pub async fn remove(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.cache.remove(key).await
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Keys whose entries are at least `ttl` old at `now`
    pub fn expired_keys(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        self.cache
            .iter()
            .filter(|(_, entry)| now - entry.timestamp >= ttl)
            .map(|(key, _)| key.as_ref().clone())
            .collect()
    }

    /// Apply pending evictions so counts are exact
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn bytes(&self) -> u64 {
        self.cache.weighted_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn entry(size: usize, timestamp: DateTime<Utc>) -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            data: Bytes::from(vec![7u8; size]),
            content_type: "image/png".to_string(),
            timestamp,
            source_locator: "http://example.com/".to_string(),
            size: size as u64,
        })
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let tier = MemoryTier::new(0);
        assert!(tier.insert("a".to_string(), entry(10, Utc::now())).await);

        assert_eq!(tier.get("a").await.unwrap().size, 10);
        tier.sync().await;
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.bytes(), 10);

        assert!(tier.remove("a").await.is_some());
        assert!(tier.get("a").await.is_none());
        tier.sync().await;
        assert_eq!(tier.bytes(), 0);
        assert!(tier.remove("a").await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_size() {
        let tier = MemoryTier::new(0);
        tier.insert("a".to_string(), entry(10, Utc::now())).await;
        tier.insert("a".to_string(), entry(4, Utc::now())).await;
        tier.sync().await;

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.bytes(), 4);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let tier = MemoryTier::new(20);
        tier.insert("a".to_string(), entry(10, Utc::now())).await;
        tier.insert("b".to_string(), entry(10, Utc::now())).await;
        tier.sync().await;

        // Touch "a" so "b" becomes the eviction candidate
        tier.get("a").await;
        tier.sync().await;
        tier.insert("c".to_string(), entry(10, Utc::now())).await;
        tier.sync().await;

        assert!(tier.get("a").await.is_some());
        assert!(tier.get("b").await.is_none());
        assert!(tier.get("c").await.is_some());
        assert!(tier.bytes() <= 20);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_skipped() {
        let tier = MemoryTier::new(8);
        assert!(!tier.insert("big".to_string(), entry(9, Utc::now())).await);
        tier.sync().await;
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing_entry() {
        let now = Utc::now();
        let tier = MemoryTier::new(0);
        tier.insert("a".to_string(), entry(4, now)).await;

        let held = tier
            .insert_if_absent("a".to_string(), entry(9, now - Duration::minutes(5)))
            .await;
        assert_eq!(held.size, 4);
        assert_eq!(tier.get("a").await.unwrap().timestamp, now);

        let held = tier.insert_if_absent("b".to_string(), entry(9, now)).await;
        assert_eq!(held.size, 9);
        assert!(tier.get("b").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_keys() {
        let now = Utc::now();
        let tier = MemoryTier::new(0);
        tier.insert("old".to_string(), entry(1, now - Duration::hours(2))).await;
        tier.insert("new".to_string(), entry(1, now)).await;

        let expired = tier.expired_keys(now, Duration::hours(1));
        assert_eq!(expired, vec!["old".to_string()]);
    }

    #[tokio::test]
    async fn test_clear() {
        let tier = MemoryTier::new(0);
        tier.insert("a".to_string(), entry(3, Utc::now())).await;
        tier.insert("b".to_string(), entry(3, Utc::now())).await;
        tier.clear().await;

        assert_eq!(tier.len(), 0);
        assert_eq!(tier.bytes(), 0);
        assert!(tier.get("a").await.is_none());
    }
}
