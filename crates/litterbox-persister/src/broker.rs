//! Broker session abstraction.
//!
//! The consumer loop only needs three things from the broker: a bounded
//! wait for the next deliveries, and a way to settle each delivery
//! (ack, nack with requeue, or reject). [`JetStreamSession`] provides them
//! over a durable JetStream pull consumer; tests use an in-memory broker.

use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer::PullConsumer};
use futures::StreamExt;
use litterbox_messaging::{BrokerConfig, BrokerConnection};
use tracing::{debug, info, warn};

/// Errors raised while talking to the broker during consumption.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The connection or topology could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Waiting for deliveries failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A delivery could not be settled.
    #[error("acknowledgement failed for delivery {tag}: {reason}")]
    Ack {
        /// Delivery tag of the message.
        tag: u64,
        /// What went wrong.
        reason: String,
    },
}

/// Settles a single delivery. Consumed on use so a delivery is settled once.
pub trait DeliveryHandle {
    /// Broker-assigned tag identifying the delivery.
    fn tag(&self) -> u64;

    /// Confirm the delivery so the broker drops it.
    async fn ack(self) -> Result<(), BrokerError>;

    /// Return the delivery to the queue for redelivery.
    async fn nack_requeue(self) -> Result<(), BrokerError>;

    /// Drop the delivery without redelivery.
    async fn reject(self) -> Result<(), BrokerError>;
}

/// A raw delivery: the payload bytes and the handle that settles it.
#[derive(Debug)]
pub struct Inbound<H> {
    /// Message body as published.
    pub payload: Vec<u8>,
    /// Handle used to ack, nack or reject the delivery.
    pub handle: H,
}

/// A live subscription to the usage queue.
pub trait BrokerSession {
    /// The delivery handle type produced by this session.
    type Handle: DeliveryHandle;

    /// Wait at most `wait` for up to `max` deliveries.
    ///
    /// Returns an empty vector if nothing arrived in time.
    async fn poll(
        &mut self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Inbound<Self::Handle>>, BrokerError>;

    /// Close the session. Unsettled deliveries are redelivered by the broker.
    async fn close(&mut self);
}

/// [`BrokerSession`] over a durable JetStream pull consumer.
#[derive(Debug)]
pub struct JetStreamSession {
    connection: BrokerConnection,
    consumer: PullConsumer,
}

impl JetStreamSession {
    /// Connect, declare the topology, and bind to the usage queue.
    ///
    /// `prefetch` caps the unacknowledged deliveries the broker hands out;
    /// `ack_wait` is how long the broker waits before redelivering one.
    pub async fn connect(
        config: &BrokerConfig,
        prefetch: u32,
        ack_wait: Duration,
    ) -> Result<Self, BrokerError> {
        let connection = BrokerConnection::connect(config)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let consumer = connection
            .declare_queue(prefetch, ack_wait)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        info!(prefetch, "consumer bound to usage queue");
        Ok(Self {
            connection,
            consumer,
        })
    }
}

impl BrokerSession for JetStreamSession {
    type Handle = JetStreamHandle;

    async fn poll(
        &mut self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Inbound<JetStreamHandle>>, BrokerError> {
        if max == 0 {
            tokio::time::sleep(wait).await;
            return Ok(Vec::new());
        }

        let mut batch = self
            .consumer
            .batch()
            .max_messages(max)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| BrokerError::Fetch(e.to_string()))?;

        let mut received = Vec::new();
        while let Some(item) = batch.next().await {
            match item {
                Ok(message) => {
                    let tag = message.info().map_or(0, |info| info.stream_sequence);
                    received.push(Inbound {
                        payload: message.message.payload.to_vec(),
                        handle: JetStreamHandle { message, tag },
                    });
                }
                Err(e) if received.is_empty() => return Err(BrokerError::Fetch(e.to_string())),
                Err(e) => {
                    warn!(error = %e, received = received.len(), "fetch interrupted, keeping partial delivery");
                    break;
                }
            }
        }

        debug!(received = received.len(), "poll complete");
        Ok(received)
    }

    async fn close(&mut self) {
        if let Err(e) = self.connection.close().await {
            warn!(error = %e, "broker close failed");
        }
    }
}

/// Delivery handle for a JetStream message.
#[derive(Debug)]
pub struct JetStreamHandle {
    message: jetstream::Message,
    tag: u64,
}

impl JetStreamHandle {
    async fn settle(self, kind: AckKind) -> Result<(), BrokerError> {
        let tag = self.tag;
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| BrokerError::Ack {
                tag,
                reason: e.to_string(),
            })
    }
}

impl DeliveryHandle for JetStreamHandle {
    fn tag(&self) -> u64 {
        self.tag
    }

    async fn ack(self) -> Result<(), BrokerError> {
        self.settle(AckKind::Ack).await
    }

    async fn nack_requeue(self) -> Result<(), BrokerError> {
        self.settle(AckKind::Nak(None)).await
    }

    async fn reject(self) -> Result<(), BrokerError> {
        self.settle(AckKind::Term).await
    }
}
