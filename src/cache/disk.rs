//! On-disk namespaced storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! <sha256(namespace)>/namespace.json   marker holding the namespace name
//! <sha256(namespace)>/<sha256(key)>.json   one record per cached key
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::storage_digest;
use super::store::{CacheStorage, CachedResponse, StoreError};

const MARKER_FILE: &str = "namespace.json";
const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct NamespaceMarker {
    name: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    #[serde(with = "time::serde::rfc3339")]
    stored_at: OffsetDateTime,
}

impl EntryRecord {
    fn new(key: &str, response: &CachedResponse) -> Self {
        Self {
            key: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: STANDARD.encode(&response.body),
            stored_at: OffsetDateTime::now_utc(),
        }
    }

    fn into_response(self, path: &Path) -> Result<CachedResponse, StoreError> {
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|err| StoreError::corrupt(path, format!("invalid body encoding: {err}")))?;
        Ok(CachedResponse {
            status: self.status,
            headers: self.headers,
            body: body.into(),
        })
    }
}

/// Filesystem-backed storage that survives restarts.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Storage rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(storage_digest(namespace))
    }

    fn record_file_name(key: &str) -> String {
        format!("{}.{RECORD_EXTENSION}", storage_digest(key))
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| StoreError::io(&dir, err))?;

        let marker_path = dir.join(MARKER_FILE);
        match fs::read(&marker_path).await {
            Ok(raw) if serde_json::from_slice::<NamespaceMarker>(&raw).is_ok() => return Ok(dir),
            Ok(_) => warn!(
                namespace = %namespace,
                path = %marker_path.display(),
                "rewriting unreadable namespace marker"
            ),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(&marker_path, err)),
        }

        let marker = NamespaceMarker {
            name: namespace.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        write_json(&marker_path, &marker).await?;
        Ok(dir)
    }

    /// Subdirectories of the root; a missing root reads as empty.
    async fn namespace_dirs(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut reader = match fs::read_dir(&self.root).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.root, err)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| StoreError::io(&self.root, err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| StoreError::io(entry.path(), err))?;
            if file_type.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Namespace name recorded in `dir`. Missing or unreadable markers make
    /// the directory invisible rather than failing the caller.
    async fn marker_name(dir: &Path) -> Result<Option<String>, StoreError> {
        let marker_path = dir.join(MARKER_FILE);
        let raw = match fs::read(&marker_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %dir.display(),
                    "directory without namespace marker; skipping"
                );
                return Ok(None);
            }
            Err(err) => return Err(StoreError::io(&marker_path, err)),
        };

        match serde_json::from_slice::<NamespaceMarker>(&raw) {
            Ok(marker) => Ok(Some(marker.name)),
            Err(err) => {
                warn!(
                    path = %marker_path.display(),
                    error = %err,
                    "unreadable namespace marker; skipping"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, namespace: &str) {
        if let Err(err) = self.ensure_namespace(namespace).await {
            debug!(
                namespace = %namespace,
                error = %err,
                "namespace could not be created yet; deferring to first write"
            );
        }
    }

    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let file_name = Self::record_file_name(key);
        for dir in self.namespace_dirs().await? {
            let path = dir.join(&file_name);
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::io(&path, err)),
            };

            let record: EntryRecord = serde_json::from_slice(&raw)
                .map_err(|err| StoreError::corrupt(&path, err.to_string()))?;
            if record.key != key {
                warn!(
                    path = %path.display(),
                    stored_key = %record.key,
                    requested_key = %key,
                    "record digest collision; ignoring entry"
                );
                continue;
            }
            if Self::marker_name(&dir).await?.is_none() {
                continue;
            }
            return record.into_response(&path).map(Some);
        }
        Ok(None)
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        response: CachedResponse,
    ) -> Result<(), StoreError> {
        let dir = self.ensure_namespace(namespace).await?;
        let record = EntryRecord::new(key, &response);
        write_json(&dir.join(Self::record_file_name(key)), &record).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for dir in self.namespace_dirs().await? {
            if let Some(name) = Self::marker_name(&dir).await? {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn delete(&self, namespace: &str) -> Result<bool, StoreError> {
        let dir = self.namespace_dir(namespace);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io(&dir, err)),
        }
    }
}

/// Write via a sibling temp file and rename so readers never see a partial record.
///
/// Each writer gets its own temp file; concurrent writers of the same path race
/// only on the rename, and the last one wins.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded =
        serde_json::to_vec(value).map_err(|err| StoreError::corrupt(path, err.to_string()))?;
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    fs::write(&tmp, &encoded)
        .await
        .map_err(|err| StoreError::io(&tmp, err))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|err| StoreError::io(path, err))
}
