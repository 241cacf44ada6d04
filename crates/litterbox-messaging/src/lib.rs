//! Wire codec and broker topology for the litterbox usage pipeline.
//!
//! Both sides of the delivery contract live on top of this crate: the
//! simulator publishes encoded [`UsageEvent`]s into the `litterbox_events`
//! stream, and the persister pulls them back out of the durable
//! `litterbox_usage_queue` consumer.
//!
//! # Architecture
//!
//! ```text
//! simulator --encode--> litterbox_events (stream, litterbox.>)
//!                              |
//!                              +-- litterbox_usage_queue (durable pull consumer,
//!                                  filter litterbox.usage, explicit ack)
//!                                      |
//!                                      +--decode--> persister
//! ```
//!
//! # Modules
//!
//! - [`codec`] -- JSON encoding and decoding of usage events
//! - [`topology`] -- Stream, queue, subject and header names
//! - [`config`] -- Broker connection settings loaded from the environment
//! - [`connection`] -- JetStream connection and idempotent topology declaration
//! - [`error`] -- Shared error types
//!
//! [`UsageEvent`]: litterbox_types::UsageEvent

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod topology;

pub use codec::{CONTENT_TYPE, CodecError, decode, encode};
pub use config::BrokerConfig;
pub use connection::BrokerConnection;
pub use error::MessagingError;
