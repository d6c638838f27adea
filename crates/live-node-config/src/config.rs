// crates/live-node-config/src/config.rs
// ============================================================================
// Module: Live Node Configuration
// Description: Configuration loading and validation for the live node daemon.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: live-node-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: the daemon refuses to
//! start rather than serve with partial settings.
//!
//! The node name and storage directory may be supplied on the command line
//! instead of the file; [`LiveNodeConfig::apply_overrides`] merges them and
//! [`LiveNodeConfig::node_settings`] enforces that both end up present.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use live_node_core::NodeIdentity;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "live-node.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "LIVE_NODE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default shared creation queue name.
pub const DEFAULT_CREATE_QUEUE: &str = "create_queue";
/// Maximum length of an AMQP queue name.
const MAX_QUEUE_NAME_LENGTH: usize = 255;
/// Upper bound for any worker pool.
pub const MAX_POOL_SIZE: usize = 256;
/// Upper bound for the statement deadline.
pub const MAX_QUERY_TIMEOUT_MS: u64 = 600_000;
/// Upper bound for a single fetched or uploaded database object.
pub const MAX_OBJECT_BYTES_LIMIT: usize = 2 * 1024 * 1024 * 1024;
/// Default object size limit.
const DEFAULT_MAX_OBJECT_BYTES: usize = 512 * 1024 * 1024;
/// Default statement deadline.
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
/// Default broker connect timeout.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for the broker connect timeout.
const MAX_CONNECT_TIMEOUT_MS: u64 = 120_000;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Live node configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveNodeConfig {
    /// Node identity and storage settings.
    #[serde(default)]
    pub node: NodeConfig,
    /// Message broker settings.
    pub broker: BrokerConfig,
    /// Worker pool sizes.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Query execution bounds.
    #[serde(default)]
    pub query: QueryConfig,
    /// Object-store backend.
    pub object_store: ObjectStoreConfig,
    /// Audit logging.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Node identity and storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Node name; also names the node's query queue.
    #[serde(default)]
    pub name: Option<String>,
    /// Base directory holding live database files.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

/// Resolved node settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    /// Validated node identity.
    pub identity: NodeIdentity,
    /// Base storage directory.
    pub storage_dir: PathBuf,
}

/// Command-line overrides for node settings.
#[derive(Debug, Clone, Default)]
pub struct NodeOverrides {
    /// Node name override.
    pub name: Option<String>,
    /// Storage directory override.
    pub storage_dir: Option<PathBuf>,
}

/// Message broker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// AMQP connection URI.
    pub uri: String,
    /// Shared creation queue name.
    #[serde(default = "default_create_queue")]
    pub create_queue: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Worker pool sizes per queue.
///
/// # Invariants
/// - A pool size of 1 serializes all work on that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Concurrent handlers for the creation queue.
    #[serde(default = "default_create_pool_size")]
    pub create_pool_size: usize,
    /// Concurrent handlers for the node query queue.
    #[serde(default = "default_query_pool_size")]
    pub query_pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            create_pool_size: default_create_pool_size(),
            query_pool_size: default_query_pool_size(),
        }
    }
}

/// Query execution bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Statement deadline in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional maximum number of result rows.
    #[serde(default)]
    pub max_rows: Option<usize>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_query_timeout_ms(),
            max_rows: None,
        }
    }
}

/// Object-store provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreProvider {
    /// Amazon S3 or an S3-compatible service.
    S3,
    /// Local directory tree (development and tests).
    Filesystem,
}

/// Object-store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    /// Provider selection for the object store.
    pub provider: ObjectStoreProvider,
    /// Bucket name (S3-only).
    #[serde(default)]
    pub bucket: String,
    /// Optional region (S3-only, defaults to environment).
    #[serde(default)]
    pub region: Option<String>,
    /// Optional object-store endpoint (S3-compatible).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Optional key prefix inside the bucket or root.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Force path-style addressing (S3-compatible).
    #[serde(default)]
    pub force_path_style: bool,
    /// Allow non-TLS endpoints (explicit opt-in).
    #[serde(default)]
    pub allow_http: bool,
    /// Root directory (filesystem-only).
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Maximum object size accepted on fetch or upload.
    #[serde(default = "default_max_object_bytes")]
    pub max_object_bytes: usize,
}

/// Audit logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// JSON-lines output file; stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl LiveNodeConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.node.validate()?;
        self.broker.validate()?;
        self.workers.validate()?;
        self.query.validate()?;
        self.object_store.validate()?;
        self.audit.validate()?;
        self.validate_queue_names()
    }

    /// Applies command-line overrides to the node section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is invalid.
    pub fn apply_overrides(&mut self, overrides: NodeOverrides) -> Result<(), ConfigError> {
        if let Some(name) = overrides.name {
            self.node.name = Some(name);
        }
        if let Some(storage_dir) = overrides.storage_dir {
            self.node.storage_dir = Some(storage_dir);
        }
        self.node.validate()?;
        self.validate_queue_names()
    }

    /// Rejects a node name that collides with the shared creation queue.
    fn validate_queue_names(&self) -> Result<(), ConfigError> {
        if self.node.name.as_deref().map(str::trim) == Some(self.broker.create_queue.trim()) {
            return Err(ConfigError::Invalid(
                "node.name must differ from broker.create_queue".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the resolved node settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the node name or storage directory is
    /// missing or invalid.
    pub fn node_settings(&self) -> Result<NodeSettings, ConfigError> {
        let Some(name) = self.node.name.as_deref() else {
            return Err(ConfigError::Invalid("node.name must be set".to_string()));
        };
        let Some(storage_dir) = self.node.storage_dir.clone() else {
            return Err(ConfigError::Invalid("node.storage_dir must be set".to_string()));
        };
        let identity =
            NodeIdentity::new(name).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(NodeSettings {
            identity,
            storage_dir,
        })
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl NodeConfig {
    /// Validates node settings that are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the node name or storage path is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            NodeIdentity::new(name.as_str())
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        if let Some(storage_dir) = &self.storage_dir {
            validate_path_string("node.storage_dir", &storage_dir.to_string_lossy())?;
        }
        Ok(())
    }
}

impl BrokerConfig {
    /// Validates broker settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the URI or queue name is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = Url::parse(self.uri.trim())
            .map_err(|_| ConfigError::Invalid("broker.uri must be a valid URI".to_string()))?;
        if !matches!(uri.scheme(), "amqp" | "amqps") {
            return Err(ConfigError::Invalid(
                "broker.uri must use amqp:// or amqps://".to_string(),
            ));
        }
        let queue = self.create_queue.trim();
        if queue.is_empty() {
            return Err(ConfigError::Invalid("broker.create_queue must be non-empty".to_string()));
        }
        if queue.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(ConfigError::Invalid("broker.create_queue exceeds max length".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > MAX_CONNECT_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "broker.connect_timeout_ms must be between 1 and {MAX_CONNECT_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

impl WorkerConfig {
    /// Validates pool sizes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a pool size is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("workers.create_pool_size", self.create_pool_size),
            ("workers.query_pool_size", self.query_pool_size),
        ] {
            if value == 0 || value > MAX_POOL_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between 1 and {MAX_POOL_SIZE}"
                )));
            }
        }
        Ok(())
    }
}

impl QueryConfig {
    /// Validates execution bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a bound is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 || self.timeout_ms > MAX_QUERY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "query.timeout_ms must be between 1 and {MAX_QUERY_TIMEOUT_MS}"
            )));
        }
        if self.max_rows == Some(0) {
            return Err(ConfigError::Invalid("query.max_rows must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl ObjectStoreConfig {
    /// Validates object-store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when object-store settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            ObjectStoreProvider::S3 => {
                if self.bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid("object_store.bucket must be set".to_string()));
                }
                if self.root.is_some() {
                    return Err(ConfigError::Invalid(
                        "object_store.root is only valid for the filesystem provider".to_string(),
                    ));
                }
            }
            ObjectStoreProvider::Filesystem => {
                let Some(root) = &self.root else {
                    return Err(ConfigError::Invalid("object_store.root must be set".to_string()));
                };
                validate_path_string("object_store.root", &root.to_string_lossy())?;
            }
        }
        if let Some(endpoint) = &self.endpoint {
            let trimmed = endpoint.trim();
            if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
                return Err(ConfigError::Invalid(
                    "object_store.endpoint must include http:// or https://".to_string(),
                ));
            }
            if trimmed.starts_with("http://") && !self.allow_http {
                return Err(ConfigError::Invalid(
                    "object_store.endpoint uses http:// without allow_http".to_string(),
                ));
            }
        }
        if let Some(prefix) = &self.prefix {
            validate_object_store_prefix(prefix)?;
        }
        if self.max_object_bytes == 0 || self.max_object_bytes > MAX_OBJECT_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "object_store.max_object_bytes must be between 1 and {MAX_OBJECT_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }
}

impl AuditConfig {
    /// Validates audit settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the audit path is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the object-store prefix string.
fn validate_object_store_prefix(value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid("object_store.prefix must be non-empty".to_string()));
    }
    if trimmed.contains('\\') {
        return Err(ConfigError::Invalid(
            "object_store.prefix must not contain backslashes".to_string(),
        ));
    }
    if trimmed.starts_with('/') {
        return Err(ConfigError::Invalid("object_store.prefix must be relative".to_string()));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("object_store.prefix exceeds max length".to_string()));
    }
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => {
                if segment.to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
                    return Err(ConfigError::Invalid(
                        "object_store.prefix segment too long".to_string(),
                    ));
                }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "object_store.prefix must not contain traversal segments".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Default creation queue name.
fn default_create_queue() -> String {
    DEFAULT_CREATE_QUEUE.to_string()
}

/// Default broker connect timeout.
const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Default creation pool size.
const fn default_create_pool_size() -> usize {
    1
}

/// Default query pool size.
const fn default_query_pool_size() -> usize {
    4
}

/// Default statement deadline.
const fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

/// Default object size limit.
const fn default_max_object_bytes() -> usize {
    DEFAULT_MAX_OBJECT_BYTES
}

/// Audit logging is on unless disabled.
const fn default_audit_enabled() -> bool {
    true
}
