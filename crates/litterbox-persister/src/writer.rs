//! Batch writer.
//!
//! Sits between the consumer loop and the store. Records are screened one
//! at a time against the validation policy, then the survivors are
//! committed as a whole batch or not at all, so the consumer can decide how
//! to settle each delivery.

use litterbox_db::{DbError, UsageStore};
use litterbox_types::{Implausibility, UsageEvent, UsageEventId};
use tracing::{debug, error, info};

/// Destination for committed batches.
///
/// Implemented by [`UsageStore`]; tests substitute an in-memory store.
pub trait BatchSink {
    /// Write every event in one transaction, returning the number committed.
    async fn insert_batch(&self, events: &[UsageEvent]) -> Result<usize, DbError>;

    /// Release the underlying connections.
    async fn close(&self);
}

impl BatchSink for UsageStore {
    async fn insert_batch(&self, events: &[UsageEvent]) -> Result<usize, DbError> {
        Self::insert_batch(self, events).await
    }

    async fn close(&self) {
        Self::close(self).await;
    }
}

/// Whether records are checked for plausibility before they are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordValidation {
    /// Write records exactly as received.
    #[default]
    Disabled,
    /// Refuse a record whose exit precedes its enter or whose exit weight
    /// exceeds its enter weight. The rest of its batch is still written.
    RejectImplausible,
}

/// Why a record or a batch was not committed.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// A record failed validation. Redelivering it cannot help.
    #[error("record {id} rejected: {reason}")]
    Rejected {
        /// The offending record.
        id: UsageEventId,
        /// What is wrong with it.
        reason: Implausibility,
    },

    /// The store refused or failed the transaction. The batch can be
    /// redelivered.
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Writes batches to a [`BatchSink`], all or nothing.
#[derive(Debug)]
pub struct BatchWriter<S> {
    sink: S,
    validation: RecordValidation,
}

impl<S: BatchSink> BatchWriter<S> {
    /// Create a writer over `sink`.
    pub const fn new(sink: S, validation: RecordValidation) -> Self {
        Self { sink, validation }
    }

    /// Check one record against the validation policy.
    ///
    /// Always passes when validation is disabled.
    pub fn check(&self, event: &UsageEvent) -> Result<(), WriteError> {
        if self.validation == RecordValidation::Disabled {
            return Ok(());
        }
        match event.implausibility() {
            None => Ok(()),
            Some(reason) => {
                error!(record_id = %event.id, %reason, "record rejected by validation");
                Err(WriteError::Rejected { id: event.id, reason })
            }
        }
    }

    /// Write a batch. On success every event is committed; on failure none is.
    ///
    /// Records are expected to have passed [`check`](Self::check) already.
    pub async fn write(&self, events: &[UsageEvent]) -> Result<usize, WriteError> {
        if events.is_empty() {
            return Ok(0);
        }

        match self.sink.insert_batch(events).await {
            Ok(written) => {
                info!(written, "batch committed");
                Ok(written)
            }
            Err(DbError::DuplicateRecord(id)) => {
                error!(record_id = %id, batch = events.len(), "duplicate record, batch rolled back");
                Err(WriteError::Store(DbError::DuplicateRecord(id)))
            }
            Err(e) => {
                error!(error = %e, batch = events.len(), "batch write failed");
                Err(WriteError::Store(e))
            }
        }
    }

    /// Close the underlying sink.
    pub async fn close(&self) {
        debug!("closing batch writer");
        self.sink.close().await;
    }
}
