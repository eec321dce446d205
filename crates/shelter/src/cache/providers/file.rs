//! # File Store
//!
//! This module implements a durable partition store. Each partition is a
//! directory under the store root; each entry is a pair of files named after
//! the SHA-256 of its request key: `{hash}.body` and `{hash}.meta` (JSON).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::types::StoreResult;
use crate::request::RequestKey;
use crate::response::StoredResponse;

use super::PartitionStore;

/// Number of lock stripes guarding entry commits and reads
const LOCK_STRIPES: usize = 64;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Metadata persisted next to each entry body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    cached_at: u64,
    size: u64,
}

/// Final locations of one entry and the stripe guarding them
struct EntryPaths {
    body: PathBuf,
    meta: PathBuf,
    stripe: usize,
}

enum EntryRead {
    Hit(StoredResponse),
    Miss,
    /// Present but unusable, removed by the caller
    Broken,
}

/// Durable partition store.
///
/// The body and metadata of an entry are replaced together: writers stage
/// both into temp files of their own and commit them under the entry's lock
/// stripe, and readers take the same stripe.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    initialized: Arc<AtomicBool>,
    locks: Arc<Vec<RwLock<()>>>,
}

impl FileStore {
    /// Create a file store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            initialized: Arc::new(AtomicBool::new(false)),
            locks: Arc::new((0..LOCK_STRIPES).map(|_| RwLock::new(())).collect()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_initialized(&self) -> io::Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        fs::create_dir_all(&self.root).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Directory of a partition. Names that could escape the root are rejected.
    fn partition_dir(&self, partition: &str) -> io::Result<PathBuf> {
        let valid = !partition.is_empty()
            && !partition.starts_with('.')
            && !partition.contains(['/', '\\']);
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid partition name: {partition:?}"),
            ));
        }
        Ok(self.root.join(partition))
    }

    fn entry_paths(&self, partition: &str, key: &RequestKey) -> io::Result<EntryPaths> {
        let dir = self.partition_dir(partition)?;

        let mut hasher = Sha256::new();
        hasher.update(key.method.as_bytes());
        hasher.update(" ");
        hasher.update(key.url.as_bytes());
        let digest = hasher.finalize();
        let stem = format!("{digest:x}");

        Ok(EntryPaths {
            body: dir.join(format!("{stem}.body")),
            meta: dir.join(format!("{stem}.meta")),
            stripe: usize::from(digest[0]) % LOCK_STRIPES,
        })
    }

    fn lock(&self, entry: &EntryPaths) -> &RwLock<()> {
        &self.locks[entry.stripe]
    }

    /// A temp file next to `path`, unique to this write
    fn temp_path(path: &Path) -> PathBuf {
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".{}-{sequence}.tmp", std::process::id()));
        PathBuf::from(name)
    }

    async fn read_meta(path: &Path) -> Option<EntryMeta> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read entry metadata");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to parse entry metadata");
                None
            }
        }
    }

    async fn read_entry(entry: &EntryPaths, key: &RequestKey) -> io::Result<EntryRead> {
        if !fs::try_exists(&entry.meta).await? || !fs::try_exists(&entry.body).await? {
            return Ok(EntryRead::Miss);
        }

        let Some(meta) = Self::read_meta(&entry.meta).await else {
            return Ok(EntryRead::Broken);
        };

        // Hash collisions are not expected, but never serve another key's body
        if &meta.key != key {
            warn!(key = %key, stored = %meta.key, "Entry key mismatch");
            return Ok(EntryRead::Miss);
        }

        let Ok(status) = StatusCode::from_u16(meta.status) else {
            warn!(key = %key, status = meta.status, "Entry metadata has an invalid status");
            return Ok(EntryRead::Broken);
        };

        let body = match fs::read(&entry.body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = ?entry.body, error = %e, "Failed to read entry body");
                return Ok(EntryRead::Miss);
            }
        };
        if body.len() as u64 != meta.size {
            warn!(key = %key, size = body.len(), expected = meta.size, "Entry body does not match its metadata");
            return Ok(EntryRead::Broken);
        }

        Ok(EntryRead::Hit(StoredResponse {
            status,
            headers: StoredResponse::headers_from_pairs(&meta.headers),
            body: body.into(),
            cached_at: meta.cached_at,
        }))
    }

    /// Remove both files of an entry. Caller holds the entry's write lock.
    async fn remove_files(entry: &EntryPaths) -> io::Result<bool> {
        let mut existed = false;
        for path in [&entry.meta, &entry.body] {
            match fs::remove_file(path).await {
                Ok(()) => existed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(existed)
    }
}

#[async_trait::async_trait]
impl PartitionStore for FileStore {
    async fn open(&self, partition: &str) -> StoreResult<()> {
        self.ensure_initialized().await?;
        fs::create_dir_all(self.partition_dir(partition)?).await
    }

    async fn partitions(&self) -> StoreResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, partition: &str) -> StoreResult<bool> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(partition, "Deleted partition directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to delete partition directory");
                Err(e)
            }
        }
    }

    async fn get(&self, partition: &str, key: &RequestKey) -> StoreResult<Option<StoredResponse>> {
        let entry = self.entry_paths(partition, key)?;

        let read = {
            let _guard = self.lock(&entry).read().await;
            Self::read_entry(&entry, key).await?
        };

        match read {
            EntryRead::Hit(response) => Ok(Some(response)),
            EntryRead::Miss => Ok(None),
            EntryRead::Broken => {
                let _guard = self.lock(&entry).write().await;
                if let Err(e) = Self::remove_files(&entry).await {
                    warn!(partition, key = %key, error = %e, "Failed to remove broken entry");
                }
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        partition: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreResult<()> {
        self.open(partition).await?;
        let entry = self.entry_paths(partition, &key)?;

        let meta = EntryMeta {
            status: response.status.as_u16(),
            headers: response.header_pairs(),
            cached_at: response.cached_at,
            size: response.size(),
            key,
        };
        let meta_json = serde_json::to_vec(&meta).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize metadata: {e}"),
            )
        })?;

        let temp_body = Self::temp_path(&entry.body);
        let temp_meta = Self::temp_path(&entry.meta);

        if let Err(e) = fs::write(&temp_body, &response.body).await {
            warn!(path = ?temp_body, error = %e, "Failed to write entry body");
            let _ = fs::remove_file(&temp_body).await;
            return Err(e);
        }

        if let Err(e) = fs::write(&temp_meta, &meta_json).await {
            warn!(path = ?temp_meta, error = %e, "Failed to write entry metadata");
            let _ = fs::remove_file(&temp_body).await;
            let _ = fs::remove_file(&temp_meta).await;
            return Err(e);
        }

        let _guard = self.lock(&entry).write().await;

        if let Err(e) = fs::rename(&temp_body, &entry.body).await {
            warn!(from = ?temp_body, to = ?entry.body, error = %e, "Failed to rename entry body");
            let _ = fs::remove_file(&temp_body).await;
            let _ = fs::remove_file(&temp_meta).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_meta, &entry.meta).await {
            warn!(from = ?temp_meta, to = ?entry.meta, error = %e, "Failed to rename entry metadata");
            // The old metadata no longer describes the body
            let _ = fs::remove_file(&entry.meta).await;
            let _ = fs::remove_file(&temp_meta).await;
            return Err(e);
        }

        debug!(partition, key = %meta.key, size = meta.size, "Stored entry on disk");
        Ok(())
    }

    async fn remove(&self, partition: &str, key: &RequestKey) -> StoreResult<bool> {
        let entry = self.entry_paths(partition, key)?;
        let _guard = self.lock(&entry).write().await;
        Self::remove_files(&entry).await
    }

    async fn keys(&self, partition: &str) -> StoreResult<Vec<RequestKey>> {
        let dir = self.partition_dir(partition)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            if let Some(meta) = Self::read_meta(&path).await {
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("https://example.com/").unwrap().join(path).unwrap())
    }

    fn snapshot(body: &str) -> StoredResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        StoredResponse::new(StatusCode::OK, headers, Bytes::from(body.to_string()))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_keeps_headers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let stored = snapshot("body");
        store.put("p-v1", key("/a"), stored.clone()).await.unwrap();

        let hit = store.get("p-v1", &key("/a")).await.unwrap().unwrap();
        assert_eq!(hit, stored);
        assert_eq!(hit.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileStore::new(dir.path())
            .put("p-v1", key("/a"), snapshot("persisted"))
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.partitions().await.unwrap(), vec!["p-v1"]);
        let hit = reopened.get("p-v1", &key("/a")).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"persisted"));
    }

    #[tokio::test]
    async fn test_keys_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("p-v1", key("/b"), snapshot("b")).await.unwrap();
        store.put("p-v1", key("/a"), snapshot("a")).await.unwrap();
        store.open("q-v1").await.unwrap();

        assert_eq!(store.keys("p-v1").await.unwrap(), vec![key("/a"), key("/b")]);
        assert!(store.keys("q-v1").await.unwrap().is_empty());

        assert!(store.delete("p-v1").await.unwrap());
        assert!(!store.delete("p-v1").await.unwrap());
        assert_eq!(store.partitions().await.unwrap(), vec!["q-v1"]);
        assert!(store.get("p-v1", &key("/a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_escaping_partition_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for name in ["", "../outside", "a/b", ".hidden"] {
            let err = store.open(name).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_replace_entry_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for round in 0..50 {
            let writers = (0..4).map(|writer| {
                let store = store.clone();
                tokio::spawn(async move {
                    // Lengths differ so a mixed entry cannot pass for a whole one
                    let body = format!("round {round} {}", "w".repeat(writer + 1));
                    let mut headers = HeaderMap::new();
                    headers.insert("x-writer", HeaderValue::from_str(&body).unwrap());
                    store
                        .put("d-v1", key("/plans"), StoredResponse::new(StatusCode::OK, headers, Bytes::from(body)))
                        .await
                })
            });
            let reader = {
                let store = store.clone();
                tokio::spawn(async move { store.get("d-v1", &key("/plans")).await })
            };

            for result in futures::future::join_all(writers).await {
                result.unwrap().unwrap();
            }
            let seen = reader.await.unwrap().unwrap();
            let settled = store.get("d-v1", &key("/plans")).await.unwrap().unwrap();
            for hit in seen.into_iter().chain([settled]) {
                assert_eq!(hit.headers.get("x-writer").unwrap().as_bytes(), &hit.body[..]);
            }
        }

        // Only committed entries remain, no temp files
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir.path().join("d-v1")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().into_string().unwrap());
        }
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    async fn rewrite_meta(store: &FileStore, partition: &str, key: &RequestKey, field: &str, value: serde_json::Value) {
        let entry = store.entry_paths(partition, key).unwrap();
        let mut meta: serde_json::Value = serde_json::from_slice(&fs::read(&entry.meta).await.unwrap()).unwrap();
        meta[field] = value;
        fs::write(&entry.meta, serde_json::to_vec(&meta).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_status_is_a_broken_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("p-v1", key("/a"), snapshot("a")).await.unwrap();

        rewrite_meta(&store, "p-v1", &key("/a"), "status", serde_json::json!(42)).await;

        assert!(store.get("p-v1", &key("/a")).await.unwrap().is_none());
        let entry = store.entry_paths("p-v1", &key("/a")).unwrap();
        assert!(!fs::try_exists(&entry.meta).await.unwrap());
        assert!(!fs::try_exists(&entry.body).await.unwrap());
        assert!(store.keys("p-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_not_matching_metadata_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("p-v1", key("/a"), snapshot("a")).await.unwrap();

        rewrite_meta(&store, "p-v1", &key("/a"), "size", serde_json::json!(999)).await;

        assert!(store.get("p-v1", &key("/a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("p-v1", key("/a"), snapshot("a")).await.unwrap();
        store.put("p-v1", key("/b"), snapshot("b")).await.unwrap();

        assert!(store.remove("p-v1", &key("/a")).await.unwrap());
        assert!(!store.remove("p-v1", &key("/a")).await.unwrap());
        assert_eq!(store.keys("p-v1").await.unwrap(), vec![key("/b")]);
    }

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("not-created"));
        assert!(store.partitions().await.unwrap().is_empty());
        assert!(store.get("p", &key("/a")).await.unwrap().is_none());
    }
}
