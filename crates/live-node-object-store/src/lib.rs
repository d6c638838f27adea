// crates/live-node-object-store/src/lib.rs
// ============================================================================
// Module: Live Node Object Store Library
// Description: Object-store backends for database materialization and backup.
// Purpose: Build the configured [`ObjectStore`] implementation.
// Dependencies: aws-sdk-s3, live-node-config, live-node-core, tokio
// ============================================================================

//! ## Overview
//! Two backends implement [`ObjectStore`]: [`S3ObjectStore`] for production
//! and [`FileObjectStore`] for single-host deployments and tests.
//! [`build_object_store`] selects one from configuration.
//! Security posture: storage is untrusted; all keys and payload sizes are
//! validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod filesystem;
pub mod keys;
pub mod s3;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use live_node_config::ObjectStoreConfig;
use live_node_config::ObjectStoreProvider;
use live_node_core::ObjectStore;
use live_node_core::ObjectStoreError;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use filesystem::FileObjectStore;
pub use s3::S3ObjectStore;

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the object store selected by configuration.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] when the configuration is invalid.
pub async fn build_object_store(
    config: &ObjectStoreConfig,
) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
    match config.provider {
        ObjectStoreProvider::S3 => Ok(Arc::new(S3ObjectStore::connect(config).await?)),
        ObjectStoreProvider::Filesystem => {
            config.validate().map_err(|err| ObjectStoreError::Invalid(err.to_string()))?;
            let Some(root) = config.root.clone() else {
                return Err(ObjectStoreError::Invalid("object_store.root must be set".to_string()));
            };
            Ok(Arc::new(FileObjectStore::new(
                root,
                config.prefix.as_deref(),
                config.max_object_bytes,
            )?))
        }
    }
}
