//! Delivery of single events to the broker.
//!
//! The publisher only depends on [`Connector`] and [`EventTransport`];
//! [`JetStreamConnector`] is the production implementation.

use litterbox_messaging::topology::{ROUTING_KEY, usage_headers};
use litterbox_messaging::{BrokerConfig, BrokerConnection, encode};
use litterbox_types::UsageEvent;
use tracing::{debug, warn};

use crate::error::PublishError;

/// Opens a transport for one publishing run.
pub trait Connector {
    /// The transport produced on success.
    type Transport: EventTransport;

    /// Connect and declare the topology.
    async fn connect(&self) -> Result<Self::Transport, PublishError>;
}

/// An open path to the broker.
pub trait EventTransport {
    /// Deliver one event and wait for the broker to confirm it.
    async fn publish(&self, event: &UsageEvent) -> Result<(), PublishError>;

    /// Flush and release the connection.
    async fn close(&self);
}

/// Connects to NATS JetStream.
#[derive(Debug, Clone)]
pub struct JetStreamConnector {
    config: BrokerConfig,
}

impl JetStreamConnector {
    /// Create a connector for the broker described by `config`.
    pub const fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

impl Connector for JetStreamConnector {
    type Transport = JetStreamTransport;

    async fn connect(&self) -> Result<JetStreamTransport, PublishError> {
        let connection = BrokerConnection::connect(&self.config)
            .await
            .map_err(|e| PublishError::Unreachable(e.to_string()))?;
        connection
            .declare_exchange()
            .await
            .map_err(|e| PublishError::Unreachable(e.to_string()))?;
        Ok(JetStreamTransport { connection })
    }
}

/// Publishes into the `litterbox_events` stream.
#[derive(Debug)]
pub struct JetStreamTransport {
    connection: BrokerConnection,
}

impl EventTransport for JetStreamTransport {
    async fn publish(&self, event: &UsageEvent) -> Result<(), PublishError> {
        let payload = encode(event)?;
        let ack = self
            .connection
            .jetstream()
            .publish_with_headers(ROUTING_KEY, usage_headers(event), payload.into())
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;
        // The stream has persisted the message once this resolves.
        let confirmed = ack
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;
        debug!(record_id = %event.id, sequence = confirmed.sequence, "published");
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            warn!(error = %e, "broker close failed");
        }
    }
}
