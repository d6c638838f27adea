// crates/live-node-broker/src/amqp.rs
// ============================================================================
// Module: AMQP Transport
// Description: RabbitMQ-compatible broker transport.
// Purpose: Consume request queues and publish correlated replies over AMQP.
// Dependencies: futures-util, lapin, live-node-config, tokio
// ============================================================================

//! ## Overview
//! [`AmqpBroker`] holds one connection. Replies are published on a shared
//! channel to the default exchange, routed by the request's `reply_to`.
//! Each consumer gets its own channel so its prefetch bound applies only to
//! that queue; acknowledgements travel back on the channel that delivered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::BasicProperties;
use lapin::Channel;
use lapin::Connection;
use lapin::ConnectionProperties;
use lapin::Consumer;
use lapin::acker::Acker;
use lapin::options::BasicAckOptions;
use lapin::options::BasicConsumeOptions;
use lapin::options::BasicPublishOptions;
use lapin::options::BasicQosOptions;
use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use live_node_config::BrokerConfig;

use crate::transport::AckHandle;
use crate::transport::Acknowledger;
use crate::transport::BrokerError;
use crate::transport::BrokerTransport;
use crate::transport::DeliveryStream;
use crate::transport::InboundMessage;
use crate::transport::OutboundMessage;
use crate::transport::QueueSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type set on every reply.
const REPLY_CONTENT_TYPE: &str = "text/json";
/// Reply code sent when closing the connection.
const CLOSE_REPLY_CODE: u16 = 200;

// ============================================================================
// SECTION: Broker
// ============================================================================

/// AMQP broker transport.
pub struct AmqpBroker {
    /// Broker connection.
    connection: Connection,
    /// Channel used for declarations and replies.
    channel: Channel,
}

impl AmqpBroker {
    /// Connects to the broker named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] when the connection or its channel
    /// cannot be opened within the configured timeout.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let connect = Connection::connect(&config.uri, ConnectionProperties::default());
        let connection = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| {
                BrokerError::Connect(format!(
                    "timed out after {} ms",
                    config.connect_timeout_ms
                ))
            })?
            .map_err(|err| BrokerError::Connect(err.to_string()))?;
        let channel =
            connection.create_channel().await.map_err(|err| BrokerError::Connect(err.to_string()))?;
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Closes the connection, ending all consumers.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] when the close handshake fails.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection
            .close(CLOSE_REPLY_CODE, "live node shutting down")
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))
    }
}

#[async_trait]
impl BrokerTransport for AmqpBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(&spec.name, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|err| BrokerError::Declare {
                queue: spec.name.clone(),
                message: err.to_string(),
            })
    }

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>, BrokerError> {
        let consume_error = |err: lapin::Error| BrokerError::Consume {
            queue: queue.to_string(),
            message: err.to_string(),
        };
        let channel = self.connection.create_channel().await.map_err(consume_error)?;
        channel.basic_qos(prefetch, BasicQosOptions::default()).await.map_err(consume_error)?;
        let consumer = channel
            .basic_consume(queue, "", BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(consume_error)?;
        Ok(Box::new(AmqpDeliveryStream {
            queue: queue.to_string(),
            consumer,
            _channel: channel,
        }))
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), BrokerError> {
        let mut properties =
            BasicProperties::default().with_content_type(REPLY_CONTENT_TYPE.into());
        if let Some(correlation_id) = message.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        self.channel
            .basic_publish(
                "",
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map(|_| ())
            .map_err(|err| BrokerError::Publish(err.to_string()))
    }
}

// ============================================================================
// SECTION: Deliveries
// ============================================================================

/// Delivery stream over one AMQP consumer.
struct AmqpDeliveryStream {
    /// Queue name, for error reporting.
    queue: String,
    /// Underlying consumer.
    consumer: Consumer,
    /// Channel kept open for the consumer's lifetime.
    _channel: Channel,
}

#[async_trait]
impl DeliveryStream for AmqpDeliveryStream {
    async fn next_delivery(&mut self) -> Option<Result<InboundMessage, BrokerError>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(|delivery| InboundMessage {
                    correlation_id: delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|value| value.as_str().to_string()),
                    reply_to: delivery
                        .properties
                        .reply_to()
                        .as_ref()
                        .map(|value| value.as_str().to_string()),
                    body: delivery.data,
                    redelivered: delivery.redelivered,
                    ack: AckHandle::new(Box::new(AmqpAcknowledger {
                        acker: delivery.acker,
                    })),
                })
                .map_err(|err| BrokerError::Consume {
                    queue: self.queue.clone(),
                    message: err.to_string(),
                }),
        )
    }
}

/// Acknowledges one AMQP delivery.
struct AmqpAcknowledger {
    /// Channel-bound acker for the delivery.
    acker: Acker,
}

#[async_trait]
impl Acknowledger for AmqpAcknowledger {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|err| BrokerError::Ack(err.to_string()))
    }
}
