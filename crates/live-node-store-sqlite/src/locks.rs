// crates/live-node-store-sqlite/src/locks.rs
// ============================================================================
// Module: Per-Database Locks
// Description: Async mutual exclusion keyed by database identity.
// Purpose: Serialize operations on one database while others run in parallel.
// Dependencies: live-node-core, tokio
// ============================================================================

//! ## Overview
//! [`KeyLocks`] hands out one async mutex per [`DatabaseKey`]. Entries are
//! created on first use and dropped when the last guard or waiter releases
//! them, so the table only tracks keys with work in flight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use live_node_core::DatabaseKey;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

// ============================================================================
// SECTION: Lock Table
// ============================================================================

/// Shared entry for one key.
type KeyEntry = Arc<AsyncMutex<()>>;

/// Per-key async lock table.
#[derive(Debug, Default)]
pub struct KeyLocks {
    /// Active entries by key.
    entries: Mutex<HashMap<DatabaseKey, KeyEntry>>,
}

impl KeyLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &DatabaseKey) -> KeyGuard<'_> {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&entry).lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            entry,
            guard: Some(guard),
        }
    }

    /// Returns how many keys currently have holders or waiters.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops the entry for `key` when nothing else references it.
    fn release(&self, key: &DatabaseKey, entry: &KeyEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // The table holds one reference and `entry` holds another.
        if Arc::strong_count(entry) == 2
            && entries.get(key).is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(key);
        }
    }
}

/// Exclusive access to one database; released on drop.
pub struct KeyGuard<'a> {
    /// Owning table.
    locks: &'a KeyLocks,
    /// Locked key.
    key: DatabaseKey,
    /// Entry kept alive for release bookkeeping.
    entry: KeyEntry,
    /// Held mutex guard.
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    /// Returns the locked key.
    #[must_use]
    pub const fn key(&self) -> &DatabaseKey {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key, &self.entry);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
