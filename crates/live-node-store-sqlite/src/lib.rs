// crates/live-node-store-sqlite/src/lib.rs
// ============================================================================
// Module: Live Node SQLite Store
// Description: Node-resident live database files backed by SQLite.
// Purpose: Materialize, introspect, query, and back up hosted databases.
// Dependencies: live-node-core, rusqlite, tempfile, tokio
// ============================================================================

//! ## Overview
//! This crate owns everything the node does to a live database file:
//! - [`layout`] maps keys to `<storage>/<owner>/<name>/live.sqlite`.
//! - [`materializer`] installs files from the object store atomically.
//! - [`guard`] opens defensive connections and filters user SQL.
//! - [`handlers`] run one operation against one file.
//! - [`host`] ties them together under per-database [`locks`].

pub mod error;
pub mod guard;
pub mod handlers;
pub mod host;
pub mod layout;
pub mod locks;
pub mod materializer;

pub use error::SqliteStoreError;
pub use guard::QueryLimits;
pub use guard::StatementPolicy;
pub use host::DatabaseHost;
pub use layout::LIVE_FILE_NAME;
pub use layout::LocalStore;
pub use locks::KeyGuard;
pub use locks::KeyLocks;
pub use materializer::MaterializeOutcome;
pub use materializer::Materializer;
