//! Per-`(tenant, namespace, collection)` schema cache.
//!
//! Misses trigger a metadata fetch and populate atomically; concurrent
//! misses on the same key collapse into one fetch via
//! [`tokio::sync::OnceCell`]. Stale entries may still be returned — the
//! optimistic CAS protocol in the update/delete operation executors is
//! what actually recovers correctness when a cached view goes stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jsonapi_core::JsonApiError;
use tokio::sync::OnceCell;

/// The cache key: tenant is optional (single-tenant deployments omit it).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant: Option<String>,
    pub namespace: String,
    pub collection: String,
}

impl CacheKey {
    pub fn new(tenant: Option<String>, namespace: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            tenant,
            namespace: namespace.into(),
            collection: collection.into(),
        }
    }
}

/// The cached facts about one collection's backing table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchemaEntry {
    pub table_exists: bool,
    pub is_json_api_collection: bool,
    pub vector_enabled: bool,
    pub vector_dimension: Option<u32>,
    pub similarity_function: Option<String>,
    pub comment: Option<String>,
}

impl CollectionSchemaEntry {
    pub fn missing() -> Self {
        Self {
            table_exists: false,
            is_json_api_collection: false,
            vector_enabled: false,
            vector_dimension: None,
            similarity_function: None,
            comment: None,
        }
    }
}

struct CacheSlot {
    cell: Arc<OnceCell<CollectionSchemaEntry>>,
    inserted_at: Instant,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            inserted_at: Instant::now(),
        }
    }
}

impl Clone for CacheSlot {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            inserted_at: self.inserted_at,
        }
    }
}

/// The schema cache. Entries expire after `ttl` and the map is bounded to
/// `max_size` — past that, the single oldest-inserted entry is evicted to
/// make room for a new key.
pub struct SchemaCache {
    entries: DashMap<CacheKey, CacheSlot>,
    ttl: Duration,
    max_size: usize,
}

impl SchemaCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invalidate one key — used after `CreateCollection`/`DropCollection`
    /// so the next read observes the new table shape immediately rather
    /// than waiting out the TTL.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Return the cached entry for `key` if present and not stale,
    /// otherwise run `fetch` exactly once across all concurrent callers
    /// racing on the same key and cache its result.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<CollectionSchemaEntry, JsonApiError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CollectionSchemaEntry, JsonApiError>>,
    {
        if let Some(entry) = self.fresh(&key) {
            return Ok(entry);
        }

        self.evict_if_full(&key);

        let slot = self
            .entries
            .entry(key)
            .and_modify(|slot| {
                if is_stale(slot, self.ttl) {
                    *slot = CacheSlot::new();
                }
            })
            .or_insert_with(CacheSlot::new)
            .clone();

        let entry = slot.cell.get_or_try_init(fetch).await?;
        Ok(entry.clone())
    }

    fn fresh(&self, key: &CacheKey) -> Option<CollectionSchemaEntry> {
        let slot = self.entries.get(key)?;
        if is_stale(&slot, self.ttl) {
            return None;
        }
        slot.cell.get().cloned()
    }

    fn evict_if_full(&self, incoming: &CacheKey) {
        if self.entries.contains_key(incoming) || self.entries.len() < self.max_size {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

fn is_stale(slot: &CacheSlot, ttl: Duration) -> bool {
    slot.inserted_at.elapsed() >= ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> CacheKey {
        CacheKey::new(None, "ns", name)
    }

    #[tokio::test]
    async fn populates_once_on_miss() {
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let calls = AtomicUsize::new(0);
        let entry = cache
            .get_or_populate(key("c"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CollectionSchemaEntry::missing())
            })
            .await
            .unwrap();
        assert!(!entry.table_exists);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache
            .get_or_populate(key("c"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CollectionSchemaEntry::missing())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should hit cache");
    }

    #[tokio::test]
    async fn stale_entry_is_refetched() {
        let cache = SchemaCache::new(Duration::from_millis(1), 10);
        cache
            .get_or_populate(key("c"), || async { Ok(CollectionSchemaEntry::missing()) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let calls = AtomicUsize::new(0);
        cache
            .get_or_populate(key("c"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CollectionSchemaEntry::missing())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = SchemaCache::new(Duration::from_secs(60), 10);
        let k = key("c");
        cache
            .get_or_populate(k.clone(), || async { Ok(CollectionSchemaEntry::missing()) })
            .await
            .unwrap();
        cache.invalidate(&k);

        let calls = AtomicUsize::new(0);
        cache
            .get_or_populate(k, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CollectionSchemaEntry::missing())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eviction_bounds_cache_size() {
        let cache = SchemaCache::new(Duration::from_secs(60), 2);
        for name in ["a", "b", "c"] {
            cache
                .get_or_populate(key(name), || async { Ok(CollectionSchemaEntry::missing()) })
                .await
                .unwrap();
        }
        assert!(cache.len() <= 2);
    }
}
