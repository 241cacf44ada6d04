//! JetStream connection and topology declaration.
//!
//! Declarations are idempotent (get-or-create), so the producer and every
//! consumer instance can declare the topology on startup without
//! coordinating who goes first.

use std::time::Duration;

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::MessagingError;
use crate::topology::{
    EXCHANGE_NAME, QUEUE_NAME, ROUTING_KEY, exchange_config, queue_config, queue_matches,
};

/// An open connection to the broker with its JetStream context.
pub struct BrokerConnection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl BrokerConnection {
    /// Connect to the broker described by `config`.
    ///
    /// Fails fast when the broker is unreachable: there is no retry on the
    /// initial connection.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Broker`] if the connection cannot be established.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, MessagingError> {
        let url = config.url();
        info!(url = url, domain = config.domain(), "connecting to broker");

        let mut options = async_nats::ConnectOptions::new()
            .name("litterbox")
            .connection_timeout(config.connect_timeout);
        if let Some((user, password)) = &config.credentials {
            options = options.user_and_password(user.clone(), password.clone());
        }

        let client = options
            .connect(url.as_str())
            .await
            .map_err(|e| MessagingError::Broker(format!("failed to connect to {url}: {e}")))?;

        let jetstream = match config.domain() {
            Some(domain) => jetstream::with_domain(client.clone(), domain),
            None => jetstream::new(client.clone()),
        };

        info!("broker connection established");
        Ok(Self { client, jetstream })
    }

    /// Declare the durable `litterbox_events` stream.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Broker`] if the stream cannot be created or looked up.
    pub async fn declare_exchange(&self) -> Result<Stream, MessagingError> {
        let stream = self
            .jetstream
            .get_or_create_stream(exchange_config())
            .await
            .map_err(|e| {
                MessagingError::Broker(format!("failed to declare stream {EXCHANGE_NAME}: {e}"))
            })?;
        debug!(stream = EXCHANGE_NAME, "stream declared");
        Ok(stream)
    }

    /// Declare the stream and bind the durable `litterbox_usage_queue`
    /// consumer to it.
    ///
    /// If the queue already exists with a different prefetch or ack wait,
    /// it is updated in place so the new flow-control settings take effect.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Broker`] if a declaration or the update fails.
    pub async fn declare_queue(
        &self,
        prefetch: u32,
        ack_wait: Duration,
    ) -> Result<PullConsumer, MessagingError> {
        let stream = self.declare_exchange().await?;
        let requested = queue_config(prefetch, ack_wait);
        let mut consumer = stream
            .get_or_create_consumer(QUEUE_NAME, requested.clone())
            .await
            .map_err(|e| {
                MessagingError::Broker(format!("failed to declare queue {QUEUE_NAME}: {e}"))
            })?;

        let existing = &consumer.cached_info().config;
        if !queue_matches(existing, &requested) {
            warn!(
                queue = QUEUE_NAME,
                current_prefetch = existing.max_ack_pending,
                current_ack_wait_secs = existing.ack_wait.as_secs(),
                prefetch,
                ack_wait_secs = ack_wait.as_secs(),
                "queue settings changed, updating consumer"
            );
            consumer = stream.update_consumer(requested).await.map_err(|e| {
                MessagingError::Broker(format!("failed to update queue {QUEUE_NAME}: {e}"))
            })?;
        }

        info!(
            queue = QUEUE_NAME,
            stream = EXCHANGE_NAME,
            routing_key = ROUTING_KEY,
            prefetch,
            ack_wait_secs = ack_wait.as_secs(),
            "queue bound to stream"
        );
        Ok(consumer)
    }

    /// Return the JetStream context.
    pub const fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Flush anything still buffered on the connection.
    ///
    /// The connection itself closes when the last handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Broker`] if the flush fails.
    pub async fn close(&self) -> Result<(), MessagingError> {
        self.client
            .flush()
            .await
            .map_err(|e| MessagingError::Broker(format!("flush failed: {e}")))?;
        info!("broker connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("state", &self.client.connection_state())
            .finish_non_exhaustive()
    }
}
