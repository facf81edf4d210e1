//! Storage Backends
//!
//! Destinations for relocated attachment bytes: a remote object store and a
//! local filesystem mirror.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use glm_core::MigrationError;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upload of {key} rejected with status {status}: {message}")]
    Rejected {
        key: String,
        status: u16,
        message: String,
    },
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for MigrationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IoError(e) => MigrationError::Io(e),
            other => MigrationError::storage(other.to_string()),
        }
    }
}

/// Remote object store receiving relocated attachments
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, sending `content_type` when known
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// A stored object, as recorded by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// In-memory object store for testing
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    reject_uploads: bool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            reject_uploads: false,
        }
    }

    /// A store that refuses every upload
    pub fn rejecting() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            reject_uploads: true,
        }
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        if self.reject_uploads {
            return Err(StorageError::Rejected {
                key: key.to_string(),
                status: 403,
                message: "AccessDenied".to_string(),
            });
        }

        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Local filesystem copy of relocated attachments, laid out by relocation key
#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Prevent directory traversal
        let escapes_root = Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes_root || key.starts_with('\\') {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(key))
    }

    /// Write `data` to `root/key`, creating parent directories
    #[instrument(skip(self, data), fields(storage = "local", size = data.len()))]
    pub async fn write(&self, key: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        debug!(path = ?path, "Attachment mirrored locally");
        Ok(path)
    }
}
