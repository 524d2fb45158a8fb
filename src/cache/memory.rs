//! In-memory namespaced storage.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::lock::{rw_read, rw_write};
use super::store::{CacheStorage, CachedResponse, StoreError};

const SOURCE: &str = "cache::memory";
const METRIC_NAMESPACE_EVICT: &str = "cachefront_cache_namespace_evict_total";

type Namespace = HashMap<String, CachedResponse>;

/// Process-local storage.
///
/// Namespaces are kept in LRU order. When a limit is configured, creating a
/// namespace beyond it evicts the least recently used one with all its
/// entries; without a limit growth is unbounded.
pub struct MemoryStorage {
    namespaces: RwLock<LruCache<String, Namespace>>,
}

impl MemoryStorage {
    pub fn new(limit: Option<NonZeroUsize>) -> Self {
        let namespaces = match limit {
            Some(limit) => LruCache::new(limit),
            None => LruCache::unbounded(),
        };
        Self {
            namespaces: RwLock::new(namespaces),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Number of namespaces currently held.
    pub fn len(&self) -> usize {
        rw_read(&self.namespaces, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_namespace(
        namespaces: &mut LruCache<String, Namespace>,
        name: &str,
        entries: Namespace,
    ) {
        if let Some((evicted, _)) = namespaces.push(name.to_string(), entries) {
            if evicted != name {
                debug!(namespace = %evicted, "namespace evicted at capacity");
                counter!(METRIC_NAMESPACE_EVICT).increment(1);
            }
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, namespace: &str) {
        let mut namespaces = rw_write(&self.namespaces, SOURCE, "open");
        if namespaces.contains(namespace) {
            namespaces.promote(namespace);
        } else {
            Self::insert_namespace(&mut namespaces, namespace, Namespace::new());
        }
    }

    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let mut namespaces = rw_write(&self.namespaces, SOURCE, "match_key");
        let found = namespaces
            .iter()
            .find_map(|(name, entries)| entries.get(key).map(|hit| (name.clone(), hit.clone())));

        Ok(found.map(|(name, response)| {
            namespaces.promote(&name);
            response
        }))
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        response: CachedResponse,
    ) -> Result<(), StoreError> {
        let mut namespaces = rw_write(&self.namespaces, SOURCE, "put");
        match namespaces.get_mut(namespace) {
            Some(entries) => {
                entries.insert(key.to_string(), response);
            }
            None => {
                let mut entries = Namespace::new();
                entries.insert(key.to_string(), response);
                Self::insert_namespace(&mut namespaces, namespace, entries);
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(rw_read(&self.namespaces, SOURCE, "keys")
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn delete(&self, namespace: &str) -> Result<bool, StoreError> {
        Ok(rw_write(&self.namespaces, SOURCE, "delete")
            .pop(namespace)
            .is_some())
    }
}
