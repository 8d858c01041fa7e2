// ABOUTME: TTL key-value seam for download token bindings and cached stats
// ABOUTME: In-process implementation included; trait keeps external stores pluggable

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::storage::StorageResult;

/// Expiring key-value store.
///
/// `take` removes and returns the live value as a single step, which is what
/// makes single-use tokens single-use under concurrent redemption.
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()>;

    async fn take(&self, key: &str) -> StorageResult<Option<String>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Process-local cache with per-entry deadlines.
///
/// Expired entries are treated as absent on read and swept opportunistically
/// on writes; there is no background reaper.
pub struct MemoryTtlCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryTtlCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTtlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn take(&self, key: &str) -> StorageResult<Option<String>> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(value, _)| value))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryTtlCache::new();
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryTtlCache::new();
        cache
            .set("k", "v", Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_take_consumes_exactly_once() {
        let cache = MemoryTtlCache::new();
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.take("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.take("k").await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_deadline() {
        let cache = MemoryTtlCache::new();
        cache
            .set("k", "v1", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        cache
            .set("k", "v2", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = MemoryTtlCache::new();
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
