//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors, plus the duplicate-id condition detected while
//! writing a batch.

use litterbox_types::UsageEventId;

/// `PostgreSQL` SQLSTATE for a unique constraint violation.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An event with this id is already stored. Nothing from the batch
    /// was committed.
    #[error("record with id {0} already exists")]
    DuplicateRecord(UsageEventId),

    /// The pool has been closed.
    #[error("PostgreSQL pool is closed")]
    Closed,

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

