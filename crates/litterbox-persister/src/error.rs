//! Error types for the persister.
//!
//! Only connection-level failures reach [`PersisterError`]. Per-message
//! decode failures and per-batch write failures are handled inside the
//! consumer loop by rejecting or requeueing deliveries.

use litterbox_db::DbError;
use litterbox_messaging::MessagingError;

use crate::broker::BrokerError;

/// Errors that stop the persister.
#[derive(Debug, thiserror::Error)]
pub enum PersisterError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// The broker could not be reached, or was lost while consuming.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Broker connection setup or topology declaration failed.
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// The store could not be reached or prepared.
    #[error("store error: {0}")]
    Store(#[from] DbError),
}
