// ABOUTME: Blob storage seam for material asset files

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::storage::{StorageError, StorageResult};

/// Read-only access to stored material assets, keyed by the relative path
/// recorded on the material row. Missing objects are `Ok(None)`, not errors;
/// archive building degrades around them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, path: &str) -> StorageResult<Option<Vec<u8>>>;
}

/// Filesystem-backed store rooted at a single directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a stored path against the root. Absolute paths and parent
    /// traversal never escape the root; they resolve to nothing.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
        let Some(full_path) = self.resolve(path) else {
            return Ok(None);
        };

        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
