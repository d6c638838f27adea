// crates/live-node-store-sqlite/src/host.rs
// ============================================================================
// Module: Database Host
// Description: Async facade over layout, materializer, locks, and handlers.
// Purpose: Run each node operation under its database lock.
// Dependencies: live-node-core, tokio
// ============================================================================

//! ## Overview
//! [`DatabaseHost`] is what the dispatcher calls. Every method takes the
//! database key lock, then runs the synchronous handler on the blocking pool.
//! Operations on a database that is not materialized fail with
//! [`NodeError::NotFound`]; only [`DatabaseHost::create`] materializes.
//! Errors leave this module as [`NodeError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use live_node_core::ColumnInfo;
use live_node_core::DatabaseKey;
use live_node_core::IndexInfo;
use live_node_core::NodeError;
use live_node_core::ObjectStore;
use live_node_core::RecordSet;

use crate::error::SqliteStoreError;
use crate::guard::QueryLimits;
use crate::handlers;
use crate::layout::LocalStore;
use crate::layout::missing_database;
use crate::locks::KeyLocks;
use crate::materializer::MaterializeOutcome;
use crate::materializer::Materializer;

// ============================================================================
// SECTION: Host
// ============================================================================

/// Node-resident database host.
pub struct DatabaseHost {
    /// Local layout.
    store: LocalStore,
    /// Materializer bound to the object store.
    materializer: Materializer,
    /// Per-database locks.
    locks: KeyLocks,
    /// Execution bounds for user SQL.
    limits: QueryLimits,
    /// Object store used for backups.
    object_store: Arc<dyn ObjectStore>,
}

impl DatabaseHost {
    /// Creates a host over a layout and object store.
    #[must_use]
    pub fn new(store: LocalStore, object_store: Arc<dyn ObjectStore>, limits: QueryLimits) -> Self {
        let materializer = Materializer::new(store.clone(), Arc::clone(&object_store));
        Self {
            store,
            materializer,
            locks: KeyLocks::new(),
            limits,
            object_store,
        }
    }

    /// Returns the local layout.
    #[must_use]
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Returns the configured execution bounds.
    #[must_use]
    pub const fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Materializes a database if it is not already present.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::MaterializationFailed`] when the authoritative
    /// copy cannot be fetched or is not a database, and
    /// [`NodeError::StorageFailed`] when the local write fails.
    pub async fn create(&self, key: &DatabaseKey) -> Result<MaterializeOutcome, NodeError> {
        let _guard = self.locks.acquire(key).await;
        Ok(self.materializer.materialize(key).await?)
    }

    /// Deletes a materialized database.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotFound`] when the database is not present and
    /// [`NodeError::StorageFailed`] when removal fails.
    pub async fn delete(&self, key: &DatabaseKey) -> Result<(), NodeError> {
        let _guard = self.locks.acquire(key).await;
        let store = self.store.clone();
        let owned = key.clone();
        run_blocking(move || store.delete(&owned)).await
    }

    /// Lists user tables.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the database is missing or unreadable.
    pub async fn tables(&self, key: &DatabaseKey) -> Result<Vec<String>, NodeError> {
        self.with_database(key, |path| handlers::list_tables(&path)).await
    }

    /// Lists views.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the database is missing or unreadable.
    pub async fn views(&self, key: &DatabaseKey) -> Result<Vec<String>, NodeError> {
        self.with_database(key, |path| handlers::list_views(&path)).await
    }

    /// Lists indexes.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when the database is missing or unreadable.
    pub async fn indexes(&self, key: &DatabaseKey) -> Result<Vec<IndexInfo>, NodeError> {
        self.with_database(key, |path| handlers::list_indexes(&path)).await
    }

    /// Lists columns and primary-key columns of a table or view.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotFound`] when the database or the table is
    /// missing.
    pub async fn columns(
        &self,
        key: &DatabaseKey,
        table: &str,
    ) -> Result<(Vec<ColumnInfo>, Vec<String>), NodeError> {
        let table = table.to_string();
        self.with_database(key, move |path| handlers::list_columns(&path, &table)).await
    }

    /// Runs a read-only statement.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::QueryRejected`], [`NodeError::QueryTimeout`],
    /// [`NodeError::LimitExceeded`], or [`NodeError::ExecutionFailed`].
    pub async fn query(&self, key: &DatabaseKey, sql: &str) -> Result<RecordSet, NodeError> {
        let sql = sql.to_string();
        let limits = self.limits;
        self.with_database(key, move |path| handlers::run_query(&path, &sql, limits)).await
    }

    /// Runs a data-changing statement and returns the changed row count.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::QueryRejected`], [`NodeError::QueryTimeout`], or
    /// [`NodeError::ExecutionFailed`].
    pub async fn execute(&self, key: &DatabaseKey, sql: &str) -> Result<u64, NodeError> {
        let sql = sql.to_string();
        let limits = self.limits;
        self.with_database(key, move |path| handlers::run_execute(&path, &sql, limits)).await
    }

    /// Returns the size of the live file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotFound`] when the database is not present.
    pub async fn size(&self, key: &DatabaseKey) -> Result<u64, NodeError> {
        let _guard = self.locks.acquire(key).await;
        let store = self.store.clone();
        let owned = key.clone();
        run_blocking(move || store.size(&owned)).await
    }

    /// Uploads a consistent snapshot of the live file to the object store.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotFound`] when the database is not present and
    /// [`NodeError::StorageFailed`] when the upload fails.
    pub async fn backup(&self, key: &DatabaseKey) -> Result<u64, NodeError> {
        let _guard = self.locks.acquire(key).await;
        let path = self.existing_path(key)?;
        let bytes = run_blocking(move || handlers::snapshot(&path)).await?;
        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        self.object_store
            .store_object(key, bytes)
            .await
            .map_err(|err| NodeError::StorageFailed(format!("backup upload failed: {err}")))?;
        Ok(size)
    }

    /// Runs `handler` on the live file under the key lock.
    async fn with_database<T, F>(&self, key: &DatabaseKey, handler: F) -> Result<T, NodeError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        let _guard = self.locks.acquire(key).await;
        let path = self.existing_path(key)?;
        run_blocking(move || handler(path)).await
    }

    /// Resolves the live file path, failing when it is absent.
    fn existing_path(&self, key: &DatabaseKey) -> Result<PathBuf, NodeError> {
        if self.store.exists(key) {
            Ok(self.store.path_for(key))
        } else {
            Err(missing_database(key).into())
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs a store call on the blocking pool.
async fn run_blocking<T, F>(call: F) -> Result<T, NodeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SqliteStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| NodeError::StorageFailed(format!("blocking task failed: {err}")))?
        .map_err(NodeError::from)
}
