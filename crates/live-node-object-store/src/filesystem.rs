// crates/live-node-object-store/src/filesystem.rs
// ============================================================================
// Module: Filesystem Object Store
// Description: Directory-backed object store for development and tests.
// Purpose: Serve database objects from a local root without a network.
// Dependencies: tempfile, tokio
// ============================================================================

//! ## Overview
//! [`FileObjectStore`] resolves objects under a root directory using the same
//! key layout as the S3 backend. Uploads are written to a temporary file in
//! the destination directory and renamed into place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use live_node_core::DatabaseKey;
use live_node_core::ObjectStore;
use live_node_core::ObjectStoreError;
use tempfile::NamedTempFile;

use crate::keys::normalize_prefix;
use crate::keys::object_key;

// ============================================================================
// SECTION: Filesystem Store
// ============================================================================

/// Directory-backed object store.
///
/// # Invariants
/// - Resolved object paths always stay below `root`.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    /// Root directory for objects.
    root: PathBuf,
    /// Normalized key prefix.
    prefix: String,
    /// Maximum object size in bytes.
    max_object_bytes: usize,
}

impl FileObjectStore {
    /// Creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when the prefix is invalid.
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: Option<&str>,
        max_object_bytes: usize,
    ) -> Result<Self, ObjectStoreError> {
        Ok(Self {
            root: root.into(),
            prefix: normalize_prefix(prefix.unwrap_or(""))?,
            max_object_bytes,
        })
    }

    /// Resolves the on-disk path of a database object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::Invalid`] when the key cannot be mapped.
    pub fn object_path(&self, key: &DatabaseKey) -> Result<PathBuf, ObjectStoreError> {
        Ok(self.root.join(object_key(&self.prefix, key)?))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn fetch_object(&self, key: &DatabaseKey) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(key)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(|err| map_io(&path, &err))?;
        if !metadata.is_file() {
            return Err(ObjectStoreError::NotFound(path.display().to_string()));
        }
        let actual_bytes = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if actual_bytes > self.max_object_bytes {
            return Err(ObjectStoreError::TooLarge {
                key: path.display().to_string(),
                max_bytes: self.max_object_bytes,
                actual_bytes,
            });
        }
        tokio::fs::read(&path).await.map_err(|err| map_io(&path, &err))
    }

    async fn store_object(
        &self,
        key: &DatabaseKey,
        bytes: Vec<u8>,
    ) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if bytes.len() > self.max_object_bytes {
            return Err(ObjectStoreError::TooLarge {
                key: path.display().to_string(),
                max_bytes: self.max_object_bytes,
                actual_bytes: bytes.len(),
            });
        }
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|err| ObjectStoreError::Io(err.to_string()))?
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes bytes to `path` via a sibling temporary file and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ObjectStoreError> {
    let Some(parent) = path.parent() else {
        return Err(ObjectStoreError::Invalid("object path has no parent".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
    let mut temp =
        NamedTempFile::new_in(parent).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
    temp.write_all(bytes).map_err(|err| ObjectStoreError::Io(err.to_string()))?;
    temp.as_file().sync_all().map_err(|err| ObjectStoreError::Io(err.to_string()))?;
    temp.persist(path).map_err(|err| ObjectStoreError::Io(err.error.to_string()))?;
    Ok(())
}

/// Maps an I/O error, distinguishing missing objects.
fn map_io(path: &Path, err: &io::Error) -> ObjectStoreError {
    if err.kind() == io::ErrorKind::NotFound {
        ObjectStoreError::NotFound(path.display().to_string())
    } else {
        ObjectStoreError::Io(err.to_string())
    }
}
