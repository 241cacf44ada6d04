//! Batch publishing with a local file safety net.
//!
//! No record is ever dropped: each one either reaches the broker or lands
//! in a fallback file. When the broker cannot be reached at all the whole
//! batch goes to a file. When it can, records are published one by one,
//! failures are logged and skipped, and the whole batch is then written to
//! a backup file.

use std::path::PathBuf;

use litterbox_types::UsageEvent;
use tracing::{error, info, warn};

use crate::error::SimulatorError;
use crate::fallback::{FallbackKind, write_fallback};
use crate::transport::{Connector, EventTransport};

/// Log publish progress after this many records.
const PROGRESS_EVERY: usize = 10;

/// Outcome of one [`Publisher::publish_batch`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSummary {
    /// Whether the broker could be reached.
    pub connected: bool,
    /// Records confirmed by the broker.
    pub published: usize,
    /// Records the broker did not confirm.
    pub failed: usize,
    /// File the batch was written to, if any.
    pub file: Option<PathBuf>,
}

/// Publishes batches through a [`Connector`], falling back to files.
#[derive(Debug)]
pub struct Publisher<C> {
    connector: C,
    fallback_dir: PathBuf,
}

impl<C: Connector> Publisher<C> {
    /// Create a publisher writing fallback files into `fallback_dir`.
    pub const fn new(connector: C, fallback_dir: PathBuf) -> Self {
        Self {
            connector,
            fallback_dir,
        }
    }

    /// Publish every event, then persist the batch locally.
    ///
    /// Individual publish failures never fail the call. The only error is
    /// a fallback file that cannot be written.
    pub async fn publish_batch(
        &self,
        events: &[UsageEvent],
    ) -> Result<PublishSummary, SimulatorError> {
        if events.is_empty() {
            return Ok(PublishSummary {
                connected: false,
                published: 0,
                failed: 0,
                file: None,
            });
        }
        info!(records = events.len(), "processing usage records");

        let transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "could not connect to broker, falling back to file storage");
                let path =
                    write_fallback(&self.fallback_dir, FallbackKind::Unreachable, events).await?;
                return Ok(PublishSummary {
                    connected: false,
                    published: 0,
                    failed: 0,
                    file: Some(path),
                });
            }
        };
        info!("connected to broker");

        let total = events.len();
        let mut published = 0_usize;
        let mut failed = 0_usize;
        for (position, event) in (1_usize..).zip(events) {
            match transport.publish(event).await {
                Ok(()) => {
                    published = published.saturating_add(1);
                    if position.checked_rem(PROGRESS_EVERY) == Some(0) || position == total {
                        info!(position, total, "publish progress");
                    }
                }
                Err(e) => {
                    failed = failed.saturating_add(1);
                    error!(record_id = %event.id, error = %e, "failed to publish record");
                }
            }
        }
        transport.close().await;
        info!(published, failed, "publishing complete");

        // Nothing confirmed means the file is the only copy, so it is named as such.
        let kind = if published > 0 {
            FallbackKind::Backup
        } else {
            warn!("no record was confirmed by the broker");
            FallbackKind::Unreachable
        };
        let path = write_fallback(&self.fallback_dir, kind, events).await?;

        Ok(PublishSummary {
            connected: true,
            published,
            failed,
            file: Some(path),
        })
    }
}
