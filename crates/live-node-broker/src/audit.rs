// crates/live-node-broker/src/audit.rs
// ============================================================================
// Module: Node Audit Logging
// Description: Structured audit events for request handling and lifecycle.
// Purpose: Emit JSON-line logs without a logging framework dependency.
// Dependencies: live-node-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Every handled delivery produces one event: a `request` event when a
//! response was published or attempted, or a `dropped` event when it was
//! acknowledged without one. Lifecycle and broker failures are logged too.
//! SQL text is never recorded; only its length in bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use live_node_config::AuditConfig;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Queue a delivery arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Shared creation queue.
    Create,
    /// Node-scoped query queue.
    Query,
}

impl QueueKind {
    /// Returns the label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Query => "query",
        }
    }
}

/// Request outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The operation succeeded.
    Ok,
    /// The operation failed and the error was reported to the caller.
    Error,
}

/// Audit record for one answered request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestAudit {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Node identity.
    pub node: String,
    /// Queue the request arrived on.
    pub queue: QueueKind,
    /// Operation label as sent.
    pub operation: String,
    /// Database owner.
    pub db_owner: String,
    /// Database name.
    pub db_name: String,
    /// End user the request runs for.
    pub requesting_user: String,
    /// Correlation identifier when provided.
    pub correlation_id: Option<String>,
    /// Whether the broker redelivered the message.
    pub redelivered: bool,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Error kind label on failure.
    pub error_kind: Option<&'static str>,
    /// Length of the query field in bytes.
    pub query_bytes: usize,
    /// Handling time in milliseconds.
    pub duration_ms: u128,
}

/// Audit record for a delivery acknowledged without a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedAudit {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Node identity.
    pub node: String,
    /// Queue the delivery arrived on.
    pub queue: QueueKind,
    /// Why no response was sent.
    pub reason: String,
    /// Correlation identifier when provided.
    pub correlation_id: Option<String>,
}

/// Audit record for a node lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleAudit {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Node identity.
    pub node: String,
    /// Lifecycle step label.
    pub stage: &'static str,
    /// Optional detail, such as a queue name.
    pub detail: Option<String>,
}

/// Audit record for a failed publish or ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerFailureAudit {
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Node identity.
    pub node: String,
    /// Failed action label.
    pub action: &'static str,
    /// Correlation identifier when provided.
    pub correlation_id: Option<String>,
    /// Failure message.
    pub message: String,
}

/// Node audit event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NodeAuditEvent {
    /// Answered request.
    Request(RequestAudit),
    /// Delivery acknowledged without a response.
    Dropped(DroppedAudit),
    /// Lifecycle step.
    Lifecycle(LifecycleAudit),
    /// Publish or ack failure.
    BrokerFailure(BrokerFailureAudit),
}

impl NodeAuditEvent {
    /// Builds a lifecycle event.
    #[must_use]
    pub fn lifecycle(node: &str, stage: &'static str, detail: Option<String>) -> Self {
        Self::Lifecycle(LifecycleAudit {
            timestamp_ms: now_ms(),
            node: node.to_string(),
            stage,
            detail,
        })
    }

    /// Builds a dropped-delivery event.
    #[must_use]
    pub fn dropped(
        node: &str,
        queue: QueueKind,
        reason: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self::Dropped(DroppedAudit {
            timestamp_ms: now_ms(),
            node: node.to_string(),
            queue,
            reason: reason.into(),
            correlation_id,
        })
    }

    /// Builds a broker failure event.
    #[must_use]
    pub fn broker_failure(
        node: &str,
        action: &'static str,
        correlation_id: Option<String>,
        message: String,
    ) -> Self {
        Self::BrokerFailure(BrokerFailureAudit {
            timestamp_ms: now_ms(),
            node: node.to_string(),
            action,
            correlation_id,
            message,
        })
    }
}

/// Returns the current time in milliseconds since the epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: &NodeAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &NodeAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &NodeAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &NodeAuditEvent) {}
}

/// Audit sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events in order.
    events: Mutex<Vec<NodeAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<NodeAuditEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &NodeAuditEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

/// Builds the sink selected by configuration.
///
/// # Errors
///
/// Returns an error if the configured log file cannot be opened.
pub fn audit_sink_from_config(config: &AuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(path)?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
