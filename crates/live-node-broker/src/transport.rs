// crates/live-node-broker/src/transport.rs
// ============================================================================
// Module: Broker Transport
// Description: Queue declaration, consumption, and publishing contracts.
// Purpose: Decouple dispatch from the concrete message broker.
// Dependencies: async-trait, live-node-core, thiserror
// ============================================================================

//! ## Overview
//! A [`BrokerTransport`] declares queues, opens consumers, and publishes
//! replies. Each consumed [`InboundMessage`] carries an [`AckHandle`] that is
//! consumed on use, so a delivery can be acknowledged at most once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use live_node_core::NodeError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Broker transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Connecting to the broker failed.
    #[error("broker connection failed: {0}")]
    Connect(String),
    /// Declaring a queue failed.
    #[error("cannot declare queue '{queue}': {message}")]
    Declare {
        /// Queue name.
        queue: String,
        /// Failure detail.
        message: String,
    },
    /// Opening or reading a consumer failed.
    #[error("cannot consume from queue '{queue}': {message}")]
    Consume {
        /// Queue name.
        queue: String,
        /// Failure detail.
        message: String,
    },
    /// The delivery stream ended while the node was still serving.
    #[error("delivery stream for queue '{0}' closed")]
    StreamClosed(String),
    /// Publishing a reply failed.
    #[error("publish failed: {0}")]
    Publish(String),
    /// Acknowledging a delivery failed.
    #[error("ack failed: {0}")]
    Ack(String),
}

impl From<BrokerError> for NodeError {
    fn from(error: BrokerError) -> Self {
        Self::Broker(error.to_string())
    }
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Queue declaration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Whether the queue survives broker restarts.
    pub durable: bool,
}

/// Reply published back to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Reply destination copied from the request.
    pub routing_key: String,
    /// Correlation identifier copied from the request.
    pub correlation_id: Option<String>,
    /// Encoded response envelope.
    pub body: Vec<u8>,
}

/// Acknowledges one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Acknowledges the delivery this handle belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Ack`] when the broker rejects the ack.
    async fn ack(&self) -> Result<(), BrokerError>;
}

/// Single-use acknowledgement handle.
pub struct AckHandle {
    /// Transport-specific acknowledger.
    inner: Box<dyn Acknowledger>,
}

impl AckHandle {
    /// Wraps a transport acknowledger.
    #[must_use]
    pub fn new(inner: Box<dyn Acknowledger>) -> Self {
        Self {
            inner,
        }
    }

    /// Acknowledges the delivery, consuming the handle.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Ack`] when the broker rejects the ack.
    pub async fn ack(self) -> Result<(), BrokerError> {
        self.inner.ack().await
    }
}

/// Delivery pulled from a queue.
pub struct InboundMessage {
    /// Correlation identifier set by the caller.
    pub correlation_id: Option<String>,
    /// Reply destination set by the caller.
    pub reply_to: Option<String>,
    /// Raw request body.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    /// Acknowledgement handle.
    pub ack: AckHandle,
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Ordered source of deliveries from one queue.
#[async_trait]
pub trait DeliveryStream: Send {
    /// Waits for the next delivery; `None` once the stream has ended.
    async fn next_delivery(&mut self) -> Option<Result<InboundMessage, BrokerError>>;
}

/// Message broker used by the node.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Declares a queue. Declaring an existing queue is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Declare`] when the broker refuses.
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError>;

    /// Starts consuming `queue` with at most `prefetch` unacknowledged
    /// deliveries outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Consume`] when the consumer cannot be opened.
    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError>;

    /// Publishes a reply.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Publish`] when the broker rejects the message.
    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError>;
}
