// crates/live-node-config/src/lib.rs
// ============================================================================
// Module: Live Node Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for live-node.toml semantics.
// Dependencies: live-node-core, serde, toml
// ============================================================================

//! ## Overview
//! `live-node-config` defines the configuration model for the live node
//! daemon and validates it fail-closed before any queue is declared.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
