//! Error types for broker connectivity and topology.

use crate::codec::CodecError;

/// Errors that can occur while talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Broker settings are missing or invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The broker could not be reached or refused an operation.
    #[error("broker error: {0}")]
    Broker(String),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
