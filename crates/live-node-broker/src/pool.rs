// crates/live-node-broker/src/pool.rs
// ============================================================================
// Module: Worker Pool
// Description: Bounded concurrent consumption of one queue.
// Purpose: Pull deliveries only when a worker slot is free.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`run_consumer`] acquires a semaphore permit before pulling each delivery,
//! so at most `pool_size` deliveries from the queue are in flight. A pool
//! size of 1 processes the queue strictly one delivery at a time. On
//! shutdown the loop stops pulling and waits for in-flight workers.
//! Per-database exclusion is handled by the host's key locks, not here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::audit::QueueKind;
use crate::dispatcher::Dispatcher;
use crate::transport::BrokerError;
use crate::transport::DeliveryStream;

// ============================================================================
// SECTION: Consumer Loop
// ============================================================================

/// Consumes `stream` with up to `pool_size` concurrent workers until
/// `shutdown` turns true or its sender is dropped.
///
/// # Errors
///
/// Returns [`BrokerError`] when the delivery stream fails or ends while the
/// node is still serving. In-flight workers are awaited first.
pub async fn run_consumer(
    dispatcher: Arc<Dispatcher>,
    queue: QueueKind,
    mut stream: Box<dyn DeliveryStream>,
    pool_size: usize,
    queue_name: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    let slots = Arc::new(Semaphore::new(pool_size.max(1)));
    let mut workers = JoinSet::new();
    let result = loop {
        if *shutdown.borrow() {
            break Ok(());
        }
        let permit = tokio::select! {
            biased;
            changed = shutdown.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break Ok(()),
            },
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break Ok(()),
            },
        };
        let delivery = tokio::select! {
            biased;
            changed = shutdown.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break Ok(()),
            },
            delivery = stream.next_delivery() => delivery,
        };
        match delivery {
            Some(Ok(message)) => {
                let dispatcher = Arc::clone(&dispatcher);
                workers.spawn(async move {
                    let _permit = permit;
                    dispatcher.handle(queue, message).await;
                });
            }
            Some(Err(err)) => break Err(err),
            None => break Err(BrokerError::StreamClosed(queue_name.to_string())),
        }
        while workers.try_join_next().is_some() {}
    };
    while workers.join_next().await.is_some() {}
    result
}
