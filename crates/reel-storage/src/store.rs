//! Object store abstraction.
//!
//! The pipeline only needs get/put/head/list against a flat key space. The
//! trait keeps R2 out of the row pipeline so tests and dry runs can swap in
//! [`MemoryStore`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Information about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp (milliseconds since epoch)
    pub last_modified: Option<u64>,
}

/// Minimal S3-style object store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object. Missing objects yield [`StorageError::NotFound`].
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Upload (overwrite) an object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Cheap existence probe.
    async fn head(&self, key: &str) -> StorageResult<bool>;

    /// List objects under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Public URL under which `key` is served.
    fn public_url(&self, key: &str) -> String;
}

/// Upload a local file.
pub async fn put_file(
    store: &dyn ObjectStore,
    path: &Path,
    key: &str,
    content_type: &str,
) -> StorageResult<()> {
    let data = tokio::fs::read(path).await?;
    store.put(key, data, content_type).await
}

/// Download an object into a local file, creating parent directories.
pub async fn get_file(store: &dyn ObjectStore, key: &str, path: &Path) -> StorageResult<()> {
    let data = store.get(key).await?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Serialize `value` as JSON and upload it.
pub async fn put_json<T: serde::Serialize + Sync>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    store.put(key, data, "application/json").await
}

/// Download and deserialize a JSON object.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> StorageResult<T> {
    let data = store.get(key).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// In-process object store.
///
/// Used for dry runs and tests. Keys can be marked as failing to simulate
/// transport faults.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing: Mutex<HashSet<String>>,
    puts: AtomicU64,
    gets: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    /// Make every operation on `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        let mut failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        failing.insert(key.into());
    }

    /// Snapshot of an object's bytes.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(key).map(|o| o.content_type.clone())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.keys().cloned().collect()
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    fn is_failing(&self, key: &str) -> bool {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        failing.contains(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.is_failing(key) {
            return Err(StorageError::download_failed(format!("injected fault: {}", key)));
        }
        self.object(key).ok_or_else(|| StorageError::not_found(key))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.is_failing(key) {
            return Err(StorageError::upload_failed(format!("injected fault: {}", key)));
        }
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        if self.is_failing(key) {
            return Err(StorageError::HeadFailed(format!("injected fault: {}", key)));
        }
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectInfo {
                key: k.clone(),
                size: o.data.len() as u64,
                last_modified: None,
            })
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("a/video.mp4", b"data".to_vec(), "video/mp4").await.unwrap();

        assert!(store.head("a/video.mp4").await.unwrap());
        assert!(!store.head("b/video.mp4").await.unwrap());
        assert_eq!(store.get("a/video.mp4").await.unwrap(), b"data");
        assert_eq!(store.content_type("a/video.mp4").unwrap(), "video/mp4");
        assert!(store.get("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_memory_store_list_prefix() {
        let store = MemoryStore::new();
        store.insert("results/worker_0.csv", "x");
        store.insert("results/worker_1.csv", "y");
        store.insert("apple/video.mp4", "z");

        let listed = store.list("results/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "results/worker_0.csv");
    }

    #[tokio::test]
    async fn test_memory_store_fault_injection() {
        let store = MemoryStore::new();
        store.fail_key("bad");
        assert!(store.put("bad", vec![1], "x").await.is_err());
        assert!(store.get("bad").await.unwrap_err().is_retryable());
        assert!(store.head("bad").await.is_err());
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        put_json(&store, "progress/worker_0.json", &vec![1u32, 2, 3]).await.unwrap();

        let back: Vec<u32> = get_json(&store, "progress/worker_0.json").await.unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert_eq!(
            store.content_type("progress/worker_0.json").unwrap(),
            "application/json"
        );

        store.insert("bad.json", "{not json");
        let err = get_json::<Vec<u32>>(&store, "bad.json").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();

        let store = MemoryStore::new();
        put_file(&store, &src, "k", "application/octet-stream").await.unwrap();

        let dst = dir.path().join("nested").join("dst.bin");
        get_file(&store, "k", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"payload");
    }
}
