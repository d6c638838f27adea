// crates/live-node-broker/src/dispatcher.rs
// ============================================================================
// Module: Request Dispatcher
// Description: Per-delivery pipeline from decode to acknowledged reply.
// Purpose: Route requests to the database host and publish correlated replies.
// Dependencies: live-node-core, live-node-store-sqlite
// ============================================================================

//! ## Overview
//! Each delivery moves through
//! `Received -> Decoded -> (Materializing) -> Executing -> Responded`, or
//! ends in `Dropped` when no reply can or should be sent.
//!
//! - Creation queue: every request materializes `(owner, name)` and the reply
//!   carries `result: success|failure`. The operation label is not consulted.
//! - Query queue: the operation label selects a handler; unknown labels are
//!   logged and acknowledged without a reply.
//! - A body that does not decode is answered with a `decode_error` when the
//!   delivery names a reply destination, and dropped otherwise. On the
//!   creation queue that answer also carries `result: failure`.
//!
//! Every delivery is acknowledged exactly once, after its reply was published
//! or deliberately skipped. A failed publish is logged and the delivery is
//! still acknowledged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use live_node_core::CreateOutcome;
use live_node_core::DatabaseKey;
use live_node_core::NodeError;
use live_node_core::NodeIdentity;
use live_node_core::Operation;
use live_node_core::RequestEnvelope;
use live_node_core::ResponseEnvelope;
use live_node_core::ResponsePayload;
use live_node_store_sqlite::DatabaseHost;

use crate::audit::AuditSink;
use crate::audit::NodeAuditEvent;
use crate::audit::QueueKind;
use crate::audit::RequestAudit;
use crate::audit::RequestOutcome;
use crate::audit::now_ms;
use crate::transport::BrokerTransport;
use crate::transport::InboundMessage;
use crate::transport::OutboundMessage;

// ============================================================================
// SECTION: Pipeline States
// ============================================================================

/// Pipeline state of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pulled from the queue.
    Received,
    /// Envelope parsed.
    Decoded,
    /// Fetching the database from the object store.
    Materializing,
    /// Running the operation.
    Executing,
    /// Reply published or attempted.
    Responded,
    /// Acknowledged without a reply.
    Dropped,
}

/// Terminal result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Terminal state, [`PipelineState::Responded`] or
    /// [`PipelineState::Dropped`].
    pub state: PipelineState,
    /// Last state reached before the terminal one.
    pub reached: PipelineState,
    /// Error kind reported to the caller, if any.
    pub error_kind: Option<&'static str>,
}

impl DispatchOutcome {
    /// Outcome for a published reply.
    const fn responded(reached: PipelineState, error_kind: Option<&'static str>) -> Self {
        Self {
            state: PipelineState::Responded,
            reached,
            error_kind,
        }
    }

    /// Outcome for a delivery acknowledged without a reply.
    const fn dropped(reached: PipelineState) -> Self {
        Self {
            state: PipelineState::Dropped,
            reached,
            error_kind: None,
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Routes deliveries to the database host.
pub struct Dispatcher {
    /// This node's identity, echoed on every reply.
    node: NodeIdentity,
    /// Database host.
    host: Arc<DatabaseHost>,
    /// Transport used for replies.
    transport: Arc<dyn BrokerTransport>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

/// Reply metadata copied from a delivery.
struct ReplyRoute {
    /// Correlation identifier.
    correlation_id: Option<String>,
    /// Reply destination.
    reply_to: String,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        node: NodeIdentity,
        host: Arc<DatabaseHost>,
        transport: Arc<dyn BrokerTransport>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            node,
            host,
            transport,
            audit,
        }
    }

    /// Returns the node identity.
    #[must_use]
    pub const fn node(&self) -> &NodeIdentity {
        &self.node
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// Handles one delivery to completion and acknowledges it.
    pub async fn handle(&self, queue: QueueKind, message: InboundMessage) -> DispatchOutcome {
        let InboundMessage {
            correlation_id,
            reply_to,
            body,
            redelivered,
            ack,
        } = message;
        let outcome = self.process(queue, correlation_id.clone(), reply_to, &body, redelivered).await;
        if let Err(err) = ack.ack().await {
            self.audit.record(&NodeAuditEvent::broker_failure(
                self.node.as_str(),
                "ack",
                correlation_id,
                err.to_string(),
            ));
        }
        outcome
    }

    /// Runs the pipeline up to, but not including, the acknowledgement.
    async fn process(
        &self,
        queue: QueueKind,
        correlation_id: Option<String>,
        reply_to: Option<String>,
        body: &[u8],
        redelivered: bool,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let decoded = RequestEnvelope::decode(body);
        let Some(reply_to) = reply_to.filter(|value| !value.is_empty()) else {
            let (reason, reached) = match decoded {
                Ok(_) => ("delivery has no reply destination", PipelineState::Decoded),
                Err(_) => ("undecodable delivery has no reply destination", PipelineState::Received),
            };
            self.audit.record(&NodeAuditEvent::dropped(
                self.node.as_str(),
                queue,
                reason,
                correlation_id,
            ));
            return DispatchOutcome::dropped(reached);
        };
        let route = ReplyRoute {
            correlation_id,
            reply_to,
        };
        let request = match decoded {
            Ok(request) => request,
            Err(err) => {
                let response = match queue {
                    QueueKind::Create => ResponseEnvelope::created(&self.node, Err(&err)),
                    QueueKind::Query => ResponseEnvelope::failure(&self.node, &err),
                };
                self.reply(&route, &response).await;
                self.record_request(queue, None, &route, redelivered, &response, started);
                return DispatchOutcome::responded(PipelineState::Received, Some(err.kind()));
            }
        };
        let (response, reached) = match queue {
            QueueKind::Create => (self.run_create(&request).await, PipelineState::Materializing),
            QueueKind::Query => {
                let Some(operation) = request.operation() else {
                    self.audit.record(&NodeAuditEvent::dropped(
                        self.node.as_str(),
                        queue,
                        format!("unknown operation '{}'", request.operation),
                        route.correlation_id,
                    ));
                    return DispatchOutcome::dropped(PipelineState::Decoded);
                };
                (self.run_query_operation(operation, &request).await, PipelineState::Executing)
            }
        };
        self.reply(&route, &response).await;
        self.record_request(queue, Some(&request), &route, redelivered, &response, started);
        DispatchOutcome::responded(reached, response.error_code)
    }

    /// Materializes the requested database and builds the create reply.
    async fn run_create(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        let result = match request.database_key() {
            Ok(key) => self.host.create(&key).await.map(|_| ()),
            Err(err) => Err(err),
        };
        ResponseEnvelope::created(&self.node, result.as_ref().map(|_| ()))
    }

    /// Runs a query-queue operation and builds its reply.
    async fn run_query_operation(
        &self,
        operation: Operation,
        request: &RequestEnvelope,
    ) -> ResponseEnvelope {
        let result = match request.database_key() {
            Ok(key) => self.execute(operation, &key, request).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(payload) => ResponseEnvelope::success(&self.node, payload),
            Err(err) if operation == Operation::Create => {
                ResponseEnvelope::created(&self.node, Err(&err))
            }
            Err(err) => ResponseEnvelope::failure(&self.node, &err),
        }
    }

    /// Closed dispatch from operation to host call.
    async fn execute(
        &self,
        operation: Operation,
        key: &DatabaseKey,
        request: &RequestEnvelope,
    ) -> Result<Option<ResponsePayload>, NodeError> {
        let payload = match operation {
            Operation::Create => {
                self.host.create(key).await?;
                ResponsePayload::Created {
                    result: CreateOutcome::Success,
                }
            }
            Operation::Delete => {
                self.host.delete(key).await?;
                return Ok(None);
            }
            Operation::Columns => {
                let (columns, pk_columns) = self.host.columns(key, &request.query).await?;
                ResponsePayload::Columns {
                    columns,
                    pk_columns,
                }
            }
            Operation::Indexes => ResponsePayload::Indexes {
                indexes: self.host.indexes(key).await?,
            },
            Operation::Query => ResponsePayload::Records {
                results: self.host.query(key, &request.query).await?,
            },
            Operation::Tables => ResponsePayload::Tables {
                tables: self.host.tables(key).await?,
            },
            Operation::Views => ResponsePayload::Views {
                views: self.host.views(key).await?,
            },
            Operation::Execute => ResponsePayload::RowsChanged {
                rows_changed: self.host.execute(key, &request.query).await?,
            },
            Operation::Size => ResponsePayload::Size {
                size: self.host.size(key).await?,
            },
            Operation::Backup => {
                self.host.backup(key).await?;
                return Ok(None);
            }
        };
        Ok(Some(payload))
    }

    /// Publishes a reply, logging publish failures.
    async fn reply(&self, route: &ReplyRoute, response: &ResponseEnvelope) {
        let message = OutboundMessage {
            routing_key: route.reply_to.clone(),
            correlation_id: route.correlation_id.clone(),
            body: response.to_bytes(),
        };
        if let Err(err) = self.transport.publish(message).await {
            self.audit.record(&NodeAuditEvent::broker_failure(
                self.node.as_str(),
                "publish",
                route.correlation_id.clone(),
                err.to_string(),
            ));
        }
    }

    /// Records the audit event for an answered request.
    fn record_request(
        &self,
        queue: QueueKind,
        request: Option<&RequestEnvelope>,
        route: &ReplyRoute,
        redelivered: bool,
        response: &ResponseEnvelope,
        started: Instant,
    ) {
        let outcome =
            if response.is_success() { RequestOutcome::Ok } else { RequestOutcome::Error };
        let event = RequestAudit {
            timestamp_ms: now_ms(),
            node: self.node.as_str().to_string(),
            queue,
            operation: request.map(|request| request.operation.clone()).unwrap_or_default(),
            db_owner: request.map(|request| request.db_owner.clone()).unwrap_or_default(),
            db_name: request.map(|request| request.db_name.clone()).unwrap_or_default(),
            requesting_user: request
                .map(|request| request.requesting_user.clone())
                .unwrap_or_default(),
            correlation_id: route.correlation_id.clone(),
            redelivered,
            outcome,
            error_kind: response.error_code,
            query_bytes: request.map_or(0, |request| request.query.len()),
            duration_ms: started.elapsed().as_millis(),
        };
        self.audit.record(&NodeAuditEvent::Request(event));
    }
}
