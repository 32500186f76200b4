//! Artifact storage collaborator
//!
//! Byte blobs and JSON documents addressed by slash-separated relative keys.
//! Two backends:
//! - [`MemoryStore`]: process-local, for tests and `--memory-store`
//! - [`FsStore`]: files under a root directory

use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Component as PathComponent, Path, PathBuf};

/// Well-known storage keys
pub mod keys {
    use stride_model::AnalysisId;

    /// Extraction document of an analysis
    #[must_use]
    pub fn extraction(id: &AnalysisId) -> String {
        format!("data/{id}.json")
    }

    /// Persisted report of an analysis
    #[must_use]
    pub fn report(id: &AnalysisId) -> String {
        format!("data/{id}_report.json")
    }

    /// Raw model output kept for repairing a degraded extraction
    #[must_use]
    pub fn raw_output(id: &AnalysisId) -> String {
        format!("data/{id}_raw.txt")
    }

    /// Source image of an analysis
    #[must_use]
    pub fn image(id: &AnalysisId, extension: &str) -> String {
        format!("static/{id}.{extension}")
    }

    /// Key of a publicly served file name
    #[must_use]
    pub fn public_file(file_name: &str) -> String {
        format!("static/{file_name}")
    }
}

/// Blob store
#[async_trait]
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Write bytes, replacing any previous value
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Read bytes; `None` when the key is absent
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a key; `false` when it was absent
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Whether a key exists
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get_bytes(key).await?.is_some())
    }

    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// Serialize a document as pretty JSON and store it
///
/// # Errors
/// - `StorageError::Serialization` if the value cannot be encoded
/// - any error from the backend
pub async fn put_json<T>(store: &dyn ArtifactStore, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized + Sync,
{
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::serialization(key, e))?;
    store.put_bytes(key, bytes).await
}

/// Load and decode a JSON document
///
/// # Errors
/// - `StorageError::Serialization` if the stored bytes do not decode as `T`
/// - any error from the backend
pub async fn get_json<T>(store: &dyn ArtifactStore, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
{
    match store.get_bytes(key).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::serialization(key, e)),
        None => Ok(None),
    }
}

/// Reject keys that are empty, absolute, or climb out of the root
///
/// # Errors
/// - `StorageError::InvalidKey`
pub fn validate_key(key: &str) -> Result<&str, StorageError> {
    let path = Path::new(key);
    let safe = !key.trim().is_empty()
        && path
            .components()
            .all(|part| matches!(part, PathComponent::Normal(_)));

    if safe {
        Ok(key)
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Stored keys, unordered
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.blobs.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let key = validate_key(key)?;
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = validate_key(key)?;
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let key = validate_key(key)?;
        Ok(self.blobs.remove(key).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// File-system store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create store; directories are created lazily on write
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(validate_key(key)?))
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        tracing::debug!(key, path = %path.display(), "stored artifact");
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    fn backend(&self) -> &'static str {
        "fs"
    }
}
