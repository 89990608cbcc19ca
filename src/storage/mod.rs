//! Artifact storage for fetched documents
//! Uses Apache Arrow object_store crate

use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot prepare artifact directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// One artifact per business key, stored as `<key>.<extension>`
#[derive(Clone)]
pub struct ArtifactStore {
    store: Arc<dyn ObjectStore>,
    root: Option<PathBuf>,
    extension: String,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>, extension: impl Into<String>) -> Self {
        Self {
            store,
            root: None,
            extension: extension.into(),
        }
    }

    /// Artifacts written under `dir`, which is created if missing
    pub fn local(dir: impl AsRef<Path>, extension: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| StorageError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let store = LocalFileSystem::new_with_prefix(dir)?;

        Ok(Self {
            store: Arc::new(store),
            root: Some(dir.to_path_buf()),
            extension: extension.into(),
        })
    }

    /// In-memory storage for tests
    pub fn in_memory(extension: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemory::new()), extension)
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Object key for a business key; path separators are flattened so every key
    /// maps to a single file directly under the artifact root
    pub fn artifact_name(&self, business_key: &str) -> String {
        let stem: String = business_key
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{}.{}", stem, self.extension)
    }

    /// Where the artifact lands on disk, for log lines
    pub fn display_path(&self, business_key: &str) -> String {
        let name = self.artifact_name(business_key);
        match &self.root {
            Some(root) => root.join(name).display().to_string(),
            None => name,
        }
    }

    pub async fn put(&self, business_key: &str, data: Bytes) -> Result<usize> {
        let path = StoragePath::from(self.artifact_name(business_key));
        let size = data.len();
        self.store.put(&path, data.into()).await?;

        tracing::debug!(key = business_key, size, "Artifact stored");
        Ok(size)
    }

    pub async fn exists(&self, business_key: &str) -> Result<bool> {
        let path = StoragePath::from(self.artifact_name(business_key));

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the artifact; true if one was present
    pub async fn delete(&self, business_key: &str) -> Result<bool> {
        // Backends disagree on whether deleting a missing object is an error
        if !self.exists(business_key).await? {
            return Ok(false);
        }
        let path = StoragePath::from(self.artifact_name(business_key));

        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}
