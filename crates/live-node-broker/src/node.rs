// crates/live-node-broker/src/node.rs
// ============================================================================
// Module: Live Node Runtime
// Description: Startup, consumption, and shutdown of one node.
// Purpose: Declare queues and serve both of them until told to stop.
// Dependencies: live-node-config, tokio
// ============================================================================

//! ## Overview
//! [`LiveNode::run`] declares the creation queue and this node's query queue,
//! opens one consumer per queue with prefetch equal to its pool size, and
//! runs both consumer loops until shutdown. Declaration and consumer errors
//! are returned to the caller, which treats them as fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use live_node_config::WorkerConfig;
use tokio::sync::watch;

use crate::audit::NodeAuditEvent;
use crate::audit::QueueKind;
use crate::dispatcher::Dispatcher;
use crate::pool::run_consumer;
use crate::topology::TopologyManager;
use crate::transport::BrokerError;
use crate::transport::BrokerTransport;

// ============================================================================
// SECTION: Node
// ============================================================================

/// A running live node.
pub struct LiveNode {
    /// Request dispatcher shared by both queues.
    dispatcher: Arc<Dispatcher>,
    /// Broker transport.
    transport: Arc<dyn BrokerTransport>,
    /// Queue declarations.
    topology: TopologyManager,
    /// Worker pool sizes.
    workers: WorkerConfig,
}

impl LiveNode {
    /// Creates a node.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn BrokerTransport>,
        create_queue: &str,
        workers: WorkerConfig,
    ) -> Self {
        let topology = TopologyManager::new(Arc::clone(&transport), create_queue);
        Self {
            dispatcher,
            transport,
            topology,
            workers,
        }
    }

    /// Serves both queues until `shutdown` turns true.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when a queue cannot be declared or consumed,
    /// or when a delivery stream fails while serving.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), BrokerError> {
        let node = self.dispatcher.node().as_str().to_string();
        let audit = self.dispatcher.audit();
        audit.record(&NodeAuditEvent::lifecycle(&node, "startup", None));

        let create_queue = self.topology.create_queue().await?;
        audit.record(&NodeAuditEvent::lifecycle(&node, "queue_declared", Some(create_queue.clone())));
        let query_queue = self.topology.node_query_queue(self.dispatcher.node()).await?;
        audit.record(&NodeAuditEvent::lifecycle(&node, "queue_declared", Some(query_queue.clone())));

        let create_stream =
            self.transport.consume(&create_queue, prefetch(self.workers.create_pool_size)).await?;
        let query_stream =
            self.transport.consume(&query_queue, prefetch(self.workers.query_pool_size)).await?;
        audit.record(&NodeAuditEvent::lifecycle(&node, "consumers_started", None));

        let served = tokio::try_join!(
            run_consumer(
                Arc::clone(&self.dispatcher),
                QueueKind::Create,
                create_stream,
                self.workers.create_pool_size,
                &create_queue,
                shutdown.clone(),
            ),
            run_consumer(
                Arc::clone(&self.dispatcher),
                QueueKind::Query,
                query_stream,
                self.workers.query_pool_size,
                &query_queue,
                shutdown,
            ),
        );
        let detail = served.as_ref().err().map(ToString::to_string);
        audit.record(&NodeAuditEvent::lifecycle(&node, "shutdown", detail));
        served.map(|_| ())
    }
}

/// Converts a pool size into an AMQP prefetch count.
fn prefetch(pool_size: usize) -> u16 {
    u16::try_from(pool_size).unwrap_or(u16::MAX)
}
