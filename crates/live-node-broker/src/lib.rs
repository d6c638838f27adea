// crates/live-node-broker/src/lib.rs
// ============================================================================
// Module: Live Node Broker Library
// Description: Queue topology, transports, dispatch, and worker pools.
// Purpose: Turn broker deliveries into database operations and replies.
// Dependencies: lapin, live-node-core, live-node-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The broker side of a live node:
//! - [`BrokerTransport`] abstracts the broker; [`AmqpBroker`] speaks AMQP and
//!   [`MemoryBroker`] runs in-process.
//! - [`TopologyManager`] declares the creation and node query queues.
//! - [`Dispatcher`] runs one delivery through decode, execution, reply, and
//!   acknowledgement.
//! - [`run_consumer`] bounds concurrency per queue; [`LiveNode`] runs both.
//!
//! Invariants:
//! - Every delivery is acknowledged exactly once.
//! - Replies echo the request's correlation identifier and reply destination.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod amqp;
pub mod audit;
pub mod dispatcher;
pub mod memory;
pub mod node;
pub mod pool;
pub mod topology;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use amqp::AmqpBroker;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NodeAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::QueueKind;
pub use audit::RequestOutcome;
pub use audit::StderrAuditSink;
pub use audit::audit_sink_from_config;
pub use dispatcher::DispatchOutcome;
pub use dispatcher::Dispatcher;
pub use dispatcher::PipelineState;
pub use memory::MemoryBroker;
pub use memory::MemoryDelivery;
pub use node::LiveNode;
pub use pool::run_consumer;
pub use topology::TopologyManager;
pub use transport::AckHandle;
pub use transport::Acknowledger;
pub use transport::BrokerError;
pub use transport::BrokerTransport;
pub use transport::DeliveryStream;
pub use transport::InboundMessage;
pub use transport::OutboundMessage;
pub use transport::QueueSpec;
