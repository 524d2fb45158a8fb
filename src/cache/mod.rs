//! Namespaced response cache.
//!
//! Responses are stored in named namespaces, each mapping a request URL to a
//! response snapshot:
//!
//! - **Memory**: process-local, LRU over namespaces when a limit is set
//! - **Disk**: one directory per namespace, survives restarts
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "memory"       # or "disk"
//! directory = ".cachefront"
//! max_namespaces = 0       # 0 = unbounded
//! namespace = "per_url"    # or "shared"
//! shared_namespace = "v1"
//! precache = []
//! ```

mod config;
mod disk;
mod keys;
mod lock;
mod memory;
mod store;

use std::sync::Arc;

pub use config::{CacheConfig, NamespaceMode, StorageBackend};
pub use disk::DiskStorage;
pub use keys::{NamespaceStrategy, storage_digest};
pub use memory::MemoryStorage;
pub use store::{Cache, CacheStorage, CachedResponse, Caches, StoreError};

pub(crate) use lock::mutex_lock;

/// Build the storage backend selected by `config`.
pub fn build_storage(config: &CacheConfig) -> Arc<dyn CacheStorage> {
    match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new(config.namespace_limit())),
        StorageBackend::Disk => Arc::new(DiskStorage::new(config.directory.clone())),
    }
}
