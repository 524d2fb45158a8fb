//! Cache storage boundary.
//!
//! `CacheStorage` is the namespaced key→response store implemented by the
//! memory and disk backends. `Caches` and `Cache` are the handles the worker
//! talks to.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Snapshot of an HTTP response.
///
/// Cloning is cheap and yields an independent copy: the body is a shared,
/// immutable `Bytes` buffer, so the copy returned to a caller and the copy
/// persisted in a namespace are always byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache storage io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache record `{path}`: {detail}")]
    Corrupt { path: PathBuf, detail: String },
    #[error("cache storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Namespaced key→response store.
///
/// Namespaces are created lazily, enumerable and individually deletable.
/// Entries are last-write-wins and never expire at this layer.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Ensure the namespace exists. Backing failures are deferred to the next
    /// read or write.
    async fn open(&self, namespace: &str);

    /// Look up `key` across every namespace. A miss is `Ok(None)`.
    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        response: CachedResponse,
    ) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove a namespace and all its entries. Returns false if it was absent.
    async fn delete(&self, namespace: &str) -> Result<bool, StoreError>;
}

/// Process-wide handle over a shared `CacheStorage`.
#[derive(Clone)]
pub struct Caches {
    storage: Arc<dyn CacheStorage>,
}

impl Caches {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Open (creating if absent) the named namespace.
    pub async fn open(&self, namespace: &str) -> Cache {
        self.storage.open(namespace).await;
        Cache {
            storage: Arc::clone(&self.storage),
            namespace: namespace.to_string(),
        }
    }

    pub async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        self.storage.match_key(key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.storage.keys().await
    }

    pub async fn delete(&self, namespace: &str) -> Result<bool, StoreError> {
        self.storage.delete(namespace).await
    }
}

/// A single opened namespace.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    namespace: String,
}

impl Cache {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StoreError> {
        self.storage.put(&self.namespace, key, response).await
    }
}
