// crates/live-node-store-sqlite/src/materializer.rs
// ============================================================================
// Module: Database Materializer
// Description: Produces the node-local copy of a database before first use.
// Purpose: Fetch authoritative bytes and install them atomically.
// Dependencies: live-node-core, tempfile, tokio
// ============================================================================

//! ## Overview
//! [`Materializer::materialize`] is idempotent per key. When the live file is
//! absent it fetches the object, writes it to a temporary file in the
//! destination directory, syncs it, and links it into place without
//! clobbering. A crash mid-write leaves only an anonymous temporary file,
//! never a partial `live.sqlite`. If a racing writer installs the file
//! first, the second attempt resolves to [`MaterializeOutcome::AlreadyPresent`].
//!
//! Failures are not retried here; the caller decides.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use live_node_core::DatabaseKey;
use live_node_core::ObjectStore;
use tempfile::NamedTempFile;

use crate::error::SqliteStoreError;
use crate::layout::LocalStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header every `SQLite` database file starts with.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a materialization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// The file was fetched and installed by this call.
    Created,
    /// The file already existed; nothing was fetched or written.
    AlreadyPresent,
}

/// Installs live database files from the object store.
#[derive(Clone)]
pub struct Materializer {
    /// Local layout.
    store: LocalStore,
    /// Authoritative object store.
    object_store: Arc<dyn ObjectStore>,
}

impl Materializer {
    /// Creates a materializer over a layout and object store.
    #[must_use]
    pub fn new(store: LocalStore, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            object_store,
        }
    }

    /// Ensures the live file for `key` exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Fetch`] or
    /// [`SqliteStoreError::InvalidImage`] when the authoritative copy cannot
    /// be used, and [`SqliteStoreError::Io`] when the local write fails.
    pub async fn materialize(
        &self,
        key: &DatabaseKey,
    ) -> Result<MaterializeOutcome, SqliteStoreError> {
        if self.store.exists(key) {
            return Ok(MaterializeOutcome::AlreadyPresent);
        }
        let bytes = self.object_store.fetch_object(key).await.map_err(|err| {
            SqliteStoreError::Fetch(format!("cannot fetch database '{key}': {err}"))
        })?;
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(SqliteStoreError::InvalidImage(format!(
                "object for database '{key}' is not a SQLite database"
            )));
        }
        let path = self.store.path_for(key);
        tokio::task::spawn_blocking(move || install_file(&path, &bytes))
            .await
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes `bytes` next to `path` and links the file into place.
fn install_file(path: &Path, bytes: &[u8]) -> Result<MaterializeOutcome, SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("database path has no parent".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    let mut temp =
        NamedTempFile::new_in(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    temp.write_all(bytes).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    temp.as_file().sync_all().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    match temp.persist_noclobber(path) {
        Ok(_) => Ok(MaterializeOutcome::Created),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(MaterializeOutcome::AlreadyPresent)
        }
        Err(err) => Err(SqliteStoreError::Io(err.error.to_string())),
    }
}
