// crates/live-node-object-store/src/keys.rs
// ============================================================================
// Module: Object Key Derivation
// Description: Prefix normalization and database object keys.
// Purpose: Map database keys to object keys with strict validation.
// Dependencies: live-node-core
// ============================================================================

//! ## Overview
//! Every database lives at `<prefix><owner>/<name>` inside the configured
//! bucket or root. Prefixes are normalized to either the empty string or a
//! relative path ending in `/`; traversal segments are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;

use live_node_core::DatabaseKey;
use live_node_core::ObjectStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single key segment.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total key length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Key Helpers
// ============================================================================

/// Derives the object key for a database.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] when the derived key is not a safe
/// relative path.
pub fn object_key(prefix: &str, key: &DatabaseKey) -> Result<String, ObjectStoreError> {
    validate_segment(key.owner())?;
    validate_segment(key.name())?;
    let object_key = format!("{prefix}{}/{}", key.owner(), key.name());
    validate_relative_path(&object_key)?;
    Ok(object_key)
}

/// Normalizes a root prefix string for object storage.
///
/// # Errors
///
/// Returns [`ObjectStoreError::Invalid`] when the prefix is absolute or
/// contains traversal.
pub fn normalize_prefix(raw: &str) -> Result<String, ObjectStoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.starts_with('/') {
        return Err(ObjectStoreError::Invalid(
            "prefix must be relative (no leading slash)".to_string(),
        ));
    }
    let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);
    validate_relative_path(normalized)?;
    Ok(format!("{normalized}/"))
}

/// Validates a relative object path.
fn validate_relative_path(path: &str) -> Result<(), ObjectStoreError> {
    if path.is_empty() {
        return Err(ObjectStoreError::Invalid("path must be set".to_string()));
    }
    if path.contains('\\') {
        return Err(ObjectStoreError::Invalid("path must not contain backslashes".to_string()));
    }
    if path.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ObjectStoreError::Invalid("path exceeds length limit".to_string()));
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(ObjectStoreError::Invalid("path must be relative".to_string()));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(value) => {
                validate_segment(&value.to_string_lossy())?;
            }
            _ => {
                return Err(ObjectStoreError::Invalid(
                    "path must be relative without traversal".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Validates a single path segment.
fn validate_segment(value: &str) -> Result<(), ObjectStoreError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(ObjectStoreError::Invalid("segment is invalid".to_string()));
    }
    if value.len() > MAX_PATH_COMPONENT_LENGTH {
        return Err(ObjectStoreError::Invalid("segment exceeds length limit".to_string()));
    }
    if value.contains(['/', '\\']) {
        return Err(ObjectStoreError::Invalid("segment contains invalid characters".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
