// crates/live-node-core/src/core/identifiers.rs
// ============================================================================
// Module: Live Node Identifiers
// Description: Node identity and logical database keys.
// Purpose: Provide validated identifiers that are safe as paths and queue names.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A logical database is identified by the pair (owner, name). Both halves
//! become directory names under the node's storage root, so they are
//! validated once here and never re-interpreted as paths elsewhere.
//!
//! The node identity names the node's private query queue and is echoed in
//! every response. It is fixed for the lifetime of the process.
//!
//! Security posture: identifiers arrive from the broker and are untrusted
//! until validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length in bytes of any single identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct IdentifierError {
    /// Field that failed validation.
    pub field: &'static str,
    /// Stable reason label.
    pub reason: &'static str,
}

// ============================================================================
// SECTION: Node Identity
// ============================================================================

/// Process-wide node identity.
///
/// # Invariants
/// - Non-empty, at most [`MAX_IDENTIFIER_LENGTH`] bytes.
/// - Only ASCII alphanumerics, `.`, `_`, and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Creates a validated node identity.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty, too long, or
    /// contains characters outside the allowed set.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentifierError {
                field: "node name",
                reason: "must be non-empty",
            });
        }
        if value.len() > MAX_IDENTIFIER_LENGTH {
            return Err(IdentifierError {
                field: "node name",
                reason: "exceeds length limit",
            });
        }
        if !value.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
        {
            return Err(IdentifierError {
                field: "node name",
                reason: "contains invalid characters",
            });
        }
        Ok(Self(value))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Database Key
// ============================================================================

/// Logical database identity: the (owner, name) pair.
///
/// # Invariants
/// - Both halves are non-empty, bounded, and safe as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseKey {
    /// Owning user name.
    owner: String,
    /// Database name within the owner's namespace.
    name: String,
}

impl DatabaseKey {
    /// Creates a validated database key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when either half is not a safe path segment.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, IdentifierError> {
        let owner = owner.into();
        let name = name.into();
        validate_segment("database owner", &owner)?;
        validate_segment("database name", &name)?;
        Ok(Self {
            owner,
            name,
        })
    }

    /// Returns the owner half of the key.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the name half of the key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a single identifier segment destined for a filesystem path.
fn validate_segment(field: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError {
            field,
            reason: "must be non-empty",
        });
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError {
            field,
            reason: "exceeds length limit",
        });
    }
    if value == "." || value == ".." {
        return Err(IdentifierError {
            field,
            reason: "is a reserved path segment",
        });
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(IdentifierError {
            field,
            reason: "contains invalid characters",
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
