// crates/live-node-core/src/lib.rs
// ============================================================================
// Module: Live Node Core Library
// Description: Public API surface for the Live Node core.
// Purpose: Expose identifiers, envelopes, errors, and collaborator interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Live Node core defines the wire contract between the API tier and a
//! storage node: request envelopes, operation-specific response payloads,
//! the error taxonomy reported back to callers, and the object-store
//! interface consumed during materialization. It performs no I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;
pub use interfaces::ObjectStore;
pub use interfaces::ObjectStoreError;
