// crates/live-node-core/src/core/mod.rs
// ============================================================================
// Module: Live Node Core Types
// Description: Canonical identifiers, envelopes, and error kinds.
// Purpose: Provide stable, serializable types for node requests and replies.
// Dependencies: base64, serde, thiserror
// ============================================================================

//! ## Overview
//! Core types are the single source of truth for the JSON shapes exchanged
//! over the broker. Identifiers validate at construction so downstream code
//! can build filesystem paths and queue names without re-checking.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod error;
pub mod identifiers;
pub mod request;
pub mod response;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::NodeError;
pub use identifiers::DatabaseKey;
pub use identifiers::IdentifierError;
pub use identifiers::MAX_IDENTIFIER_LENGTH;
pub use identifiers::NodeIdentity;
pub use request::MAX_REQUEST_BYTES;
pub use request::Operation;
pub use request::RequestEnvelope;
pub use response::CellValue;
pub use response::ColumnInfo;
pub use response::CreateOutcome;
pub use response::IndexColumn;
pub use response::IndexInfo;
pub use response::RecordSet;
pub use response::ResponseEnvelope;
pub use response::ResponsePayload;
