// crates/live-node-broker/src/memory.rs
// ============================================================================
// Module: In-Memory Transport
// Description: Process-local broker transport for tests and embedding.
// Purpose: Exercise dispatch end-to-end without an external broker.
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! [`MemoryBroker`] keeps one unbounded channel per queue and collects
//! published replies in another. Queues exist once declared or sent to;
//! each queue can be consumed once. Every delivery gets a tag, and acks are
//! recorded by tag so callers can verify exactly-once acknowledgement.
//! Publish and declare failures can be injected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

use crate::transport::AckHandle;
use crate::transport::Acknowledger;
use crate::transport::BrokerError;
use crate::transport::BrokerTransport;
use crate::transport::DeliveryStream;
use crate::transport::InboundMessage;
use crate::transport::OutboundMessage;
use crate::transport::QueueSpec;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request as a caller would publish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDelivery {
    /// Correlation identifier.
    pub correlation_id: Option<String>,
    /// Reply destination.
    pub reply_to: Option<String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl MemoryDelivery {
    /// Builds an addressable request.
    #[must_use]
    pub fn new(correlation_id: &str, reply_to: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id: Some(correlation_id.to_string()),
            reply_to: Some(reply_to.to_string()),
            body: body.into(),
        }
    }
}

/// Per-queue channel ends.
struct MemoryQueue {
    /// Sender used by callers.
    sender: mpsc::UnboundedSender<InboundMessage>,
    /// Receiver handed to the single consumer.
    receiver: Option<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// In-memory broker transport.
pub struct MemoryBroker {
    /// Queues by name.
    queues: Mutex<HashMap<String, MemoryQueue>>,
    /// Declarations in call order.
    declarations: Mutex<Vec<QueueSpec>>,
    /// Consumers opened, as `(queue, prefetch)`.
    consumers: Mutex<Vec<(String, u16)>>,
    /// Sender for published replies.
    reply_sender: mpsc::UnboundedSender<OutboundMessage>,
    /// Receiver for published replies.
    reply_receiver: AsyncMutex<mpsc::UnboundedReceiver<OutboundMessage>>,
    /// Acknowledged delivery tags.
    acks: Arc<Mutex<Vec<u64>>>,
    /// Next delivery tag.
    next_tag: AtomicU64,
    /// When set, publishes fail.
    fail_publish: AtomicBool,
    /// When set, declarations fail.
    fail_declare: AtomicBool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        let (reply_sender, reply_receiver) = mpsc::unbounded_channel();
        Self {
            queues: Mutex::new(HashMap::new()),
            declarations: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
            reply_sender,
            reply_receiver: AsyncMutex::new(reply_receiver),
            acks: Arc::new(Mutex::new(Vec::new())),
            next_tag: AtomicU64::new(1),
            fail_publish: AtomicBool::new(false),
            fail_declare: AtomicBool::new(false),
        }
    }

    /// Builds a delivery without enqueuing it, returning its tag.
    #[must_use]
    pub fn inbound(&self, delivery: MemoryDelivery) -> (u64, InboundMessage) {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let message = InboundMessage {
            correlation_id: delivery.correlation_id,
            reply_to: delivery.reply_to,
            body: delivery.body,
            redelivered: false,
            ack: AckHandle::new(Box::new(MemoryAcknowledger {
                tag,
                acks: Arc::clone(&self.acks),
            })),
        };
        (tag, message)
    }

    /// Enqueues a delivery on `queue`, returning its tag.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Consume`] when the queue's consumer is gone.
    pub fn send(&self, queue: &str, delivery: MemoryDelivery) -> Result<u64, BrokerError> {
        let (tag, message) = self.inbound(delivery);
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = queues.entry(queue.to_string()).or_insert_with(MemoryQueue::new);
        entry.sender.send(message).map_err(|_| BrokerError::Consume {
            queue: queue.to_string(),
            message: "consumer dropped".to_string(),
        })?;
        Ok(tag)
    }

    /// Waits for the next published reply.
    pub async fn next_reply(&self) -> Option<OutboundMessage> {
        self.reply_receiver.lock().await.recv().await
    }

    /// Returns acknowledged delivery tags in ack order.
    #[must_use]
    pub fn acked(&self) -> Vec<u64> {
        self.acks.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns queue declarations in call order.
    #[must_use]
    pub fn declarations(&self) -> Vec<QueueSpec> {
        self.declarations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns opened consumers as `(queue, prefetch)`.
    #[must_use]
    pub fn consumers(&self) -> Vec<(String, u16)> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Makes subsequent publishes fail or succeed.
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent declarations fail or succeed.
    pub fn set_declare_failure(&self, fail: bool) {
        self.fail_declare.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        if self.fail_declare.load(Ordering::SeqCst) {
            return Err(BrokerError::Declare {
                queue: spec.name.clone(),
                message: "declaration refused".to_string(),
            });
        }
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(spec.name.clone())
            .or_insert_with(MemoryQueue::new);
        self.declarations.lock().unwrap_or_else(PoisonError::into_inner).push(spec.clone());
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        let receiver = {
            let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = queues.get_mut(queue) else {
                return Err(BrokerError::Consume {
                    queue: queue.to_string(),
                    message: "queue not declared".to_string(),
                });
            };
            entry.receiver.take().ok_or_else(|| BrokerError::Consume {
                queue: queue.to_string(),
                message: "queue already has a consumer".to_string(),
            })?
        };
        self.consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((queue.to_string(), prefetch));
        Ok(Box::new(MemoryDeliveryStream {
            receiver,
        }))
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish("publish refused".to_string()));
        }
        self.reply_sender
            .send(message)
            .map_err(|_| BrokerError::Publish("reply channel closed".to_string()))
    }
}

// ============================================================================
// SECTION: Deliveries
// ============================================================================

/// Stream over one in-memory queue.
struct MemoryDeliveryStream {
    /// Queue receiver.
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next_delivery(&mut self) -> Option<Result<InboundMessage, BrokerError>> {
        self.receiver.recv().await.map(Ok)
    }
}

/// Records the ack of one delivery.
struct MemoryAcknowledger {
    /// Delivery tag.
    tag: u64,
    /// Shared ack log.
    acks: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl Acknowledger for MemoryAcknowledger {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.acks.lock().unwrap_or_else(PoisonError::into_inner).push(self.tag);
        Ok(())
    }
}
