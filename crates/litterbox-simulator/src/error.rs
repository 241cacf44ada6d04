//! Error types for the simulator.

use std::path::PathBuf;

use litterbox_messaging::{CodecError, MessagingError};

/// Errors that stop the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// Broker settings could not be loaded.
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// A fallback file could not be written or read.
    #[error("fallback file {path}: {source}")]
    Fallback {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A fallback file does not hold a JSON array of usage events.
    #[error("fallback file {path} is not a usage event array: {source}")]
    FallbackFormat {
        /// File that was being parsed or written.
        path: PathBuf,
        /// Underlying serialization error.
        source: serde_json::Error,
    },
}

/// Why a single record could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The broker could not be reached.
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// The record could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The broker refused or never confirmed the record.
    #[error("publish failed: {0}")]
    Broker(String),
}
