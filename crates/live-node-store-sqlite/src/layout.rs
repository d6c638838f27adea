// crates/live-node-store-sqlite/src/layout.rs
// ============================================================================
// Module: Local Database Store
// Description: On-disk layout and deletion of live database files.
// Purpose: Map database keys to `<base>/<owner>/<name>/live.sqlite`.
// Dependencies: live-node-core
// ============================================================================

//! ## Overview
//! [`LocalStore`] owns the node's storage root. Path resolution is pure;
//! deletion removes the live file and its journal sidecars, then the
//! per-database directory. The per-owner directory is never removed here:
//! sibling databases of the same owner may be mid-operation.
//!
//! If the file is removed but the directory is not, the error is reported
//! and the orphaned empty directory is left behind. The disk space held by
//! the file is already released at that point.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use live_node_core::DatabaseKey;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name of every live database.
pub const LIVE_FILE_NAME: &str = "live.sqlite";
/// Journal sidecars removed together with the live file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

// ============================================================================
// SECTION: Local Store
// ============================================================================

/// Node-local database layout.
///
/// # Invariants
/// - At most one live file exists per [`DatabaseKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStore {
    /// Storage root.
    base_dir: PathBuf,
}

impl LocalStore {
    /// Creates a layout rooted at `base_dir` without touching disk.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Creates a layout and ensures the storage root exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Io`] when the directory cannot be created.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, SqliteStoreError> {
        let store = Self::new(base_dir);
        fs::create_dir_all(&store.base_dir).map_err(|err| {
            SqliteStoreError::Io(format!(
                "cannot create storage directory {}: {err}",
                store.base_dir.display()
            ))
        })?;
        Ok(store)
    }

    /// Returns the storage root.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the per-database directory.
    #[must_use]
    pub fn database_dir(&self, key: &DatabaseKey) -> PathBuf {
        self.base_dir.join(key.owner()).join(key.name())
    }

    /// Returns the live file path for a database.
    #[must_use]
    pub fn path_for(&self, key: &DatabaseKey) -> PathBuf {
        self.database_dir(key).join(LIVE_FILE_NAME)
    }

    /// Returns true when the live file exists.
    #[must_use]
    pub fn exists(&self, key: &DatabaseKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Returns the size of the live file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the file is absent.
    pub fn size(&self, key: &DatabaseKey) -> Result<u64, SqliteStoreError> {
        match fs::metadata(self.path_for(key)) {
            Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
            Ok(_) => Err(missing_database(key)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(missing_database(key)),
            Err(err) => Err(SqliteStoreError::Io(err.to_string())),
        }
    }

    /// Deletes the live file, its sidecars, and the per-database directory.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when no live file exists, or
    /// [`SqliteStoreError::Io`] when removal fails. A directory removal
    /// failure is reported even though the file is already gone.
    pub fn delete(&self, key: &DatabaseKey) -> Result<(), SqliteStoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(missing_database(key));
            }
            Err(err) => {
                return Err(SqliteStoreError::Io(format!("cannot remove database file: {err}")));
            }
        }
        for suffix in SIDECAR_SUFFIXES {
            match fs::remove_file(sidecar_path(&path, suffix)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(SqliteStoreError::Io(format!(
                        "database file removed but sidecar cleanup failed: {err}"
                    )));
                }
            }
        }
        fs::remove_dir(self.database_dir(key)).map_err(|err| {
            SqliteStoreError::Io(format!(
                "database file removed but directory cleanup failed: {err}"
            ))
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the not-found error for a missing database.
pub(crate) fn missing_database(key: &DatabaseKey) -> SqliteStoreError {
    SqliteStoreError::NotFound(format!("database '{key}' does not exist on this node"))
}

/// Appends a sidecar suffix to a database path.
fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}
