// crates/live-node-core/src/interfaces/mod.rs
// ============================================================================
// Module: Live Node Interfaces
// Description: Collaborator contracts consumed by the node.
// Purpose: Decouple materialization and backup from object-store backends.
// Dependencies: async-trait, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The object store holds the authoritative bytes of every database. The node
//! fetches them once per materialization and uploads snapshots on backup.
//! Backends must enforce their configured size limits and must report a
//! missing object as [`ObjectStoreError::NotFound`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use crate::core::identifiers::DatabaseKey;

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Object-store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    /// Invalid configuration or key input.
    #[error("object store invalid: {0}")]
    Invalid(String),
    /// Object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Backend I/O failure.
    #[error("object store io error: {0}")]
    Io(String),
    /// Backend returned an error.
    #[error("object store backend error: {0}")]
    Backend(String),
    /// Object exceeds size limits.
    #[error("object too large: {key} ({actual_bytes} > {max_bytes})")]
    TooLarge {
        /// Object key.
        key: String,
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual size in bytes.
        actual_bytes: usize,
    },
}

/// Authoritative storage for database bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches the authoritative bytes for a database.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::NotFound`] when no object exists for the
    /// key, or another variant on backend failure.
    async fn fetch_object(&self, key: &DatabaseKey) -> Result<Vec<u8>, ObjectStoreError>;

    /// Stores a database snapshot, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the upload fails.
    async fn store_object(&self, key: &DatabaseKey, bytes: Vec<u8>)
    -> Result<(), ObjectStoreError>;
}
