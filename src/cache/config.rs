//! Cache configuration.
//!
//! Controls the storage backend, namespace layout and capacity hook.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_DIRECTORY: &str = ".cachefront";
const DEFAULT_SHARED_NAMESPACE: &str = "v1";

/// Which storage backend holds cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    Memory,
    /// One directory per namespace under `CacheConfig::directory`.
    Disk,
}

/// How a request maps to the namespace its response is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceMode {
    /// One namespace per request URL.
    PerUrl,
    /// A single namespace holding every URL key.
    Shared,
}

/// Resolved cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: StorageBackend,
    /// Root directory for the disk backend.
    pub directory: PathBuf,
    /// Maximum namespaces kept by the memory backend. Zero means unbounded.
    pub max_namespaces: usize,
    pub namespace_mode: NamespaceMode,
    /// Namespace name used when `namespace_mode` is `Shared`.
    pub shared_namespace: String,
    /// Origin-relative paths fetched and stored once activation has purged the store.
    pub precache: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            max_namespaces: 0,
            namespace_mode: NamespaceMode::PerUrl,
            shared_namespace: DEFAULT_SHARED_NAMESPACE.to_string(),
            precache: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Namespace capacity for LRU eviction, `None` when growth is unbounded.
    pub fn namespace_limit(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.max_namespaces)
    }

    /// Returns true if activation has anything to pre-warm.
    pub fn has_precache(&self) -> bool {
        !self.precache.is_empty()
    }
}
