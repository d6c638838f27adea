// crates/live-node-broker/src/topology.rs
// ============================================================================
// Module: Broker Topology
// Description: Declaration of the queues a node consumes.
// Purpose: Establish the shared creation queue and the node's query queue.
// Dependencies: live-node-core
// ============================================================================

//! ## Overview
//! Every node consumes two queues:
//! - the shared, durable creation queue; whichever node dequeues a creation
//!   request becomes the host of that database;
//! - a non-durable queue named after the node identity, carrying every
//!   operation addressed to databases already hosted here.
//!
//! Declarations are idempotent. A failure here is fatal to startup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use live_node_core::NodeIdentity;

use crate::transport::BrokerError;
use crate::transport::BrokerTransport;
use crate::transport::QueueSpec;

// ============================================================================
// SECTION: Topology
// ============================================================================

/// Declares the node's input queues.
pub struct TopologyManager {
    /// Transport used for declarations.
    transport: Arc<dyn BrokerTransport>,
    /// Shared creation queue name.
    create_queue: String,
}

impl TopologyManager {
    /// Creates a topology manager for the given creation queue name.
    #[must_use]
    pub fn new(transport: Arc<dyn BrokerTransport>, create_queue: impl Into<String>) -> Self {
        Self {
            transport,
            create_queue: create_queue.into(),
        }
    }

    /// Declares the shared creation queue and returns its name.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Declare`] when the broker refuses.
    pub async fn create_queue(&self) -> Result<String, BrokerError> {
        let spec = QueueSpec {
            name: self.create_queue.clone(),
            durable: true,
        };
        self.transport.declare_queue(&spec).await?;
        Ok(spec.name)
    }

    /// Declares the query queue for `node` and returns its name.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Declare`] when the broker refuses.
    pub async fn node_query_queue(&self, node: &NodeIdentity) -> Result<String, BrokerError> {
        let spec = QueueSpec {
            name: node.as_str().to_string(),
            durable: false,
        };
        self.transport.declare_queue(&spec).await?;
        Ok(spec.name)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
