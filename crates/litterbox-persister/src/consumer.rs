//! The consumer loop.
//!
//! A single task drives everything: it waits a bounded slice for
//! deliveries, decodes each one into the accumulator, flushes ready batches
//! through the writer, and settles every delivery according to the write
//! outcome. Nothing is acknowledged before its batch has committed.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --attach--> Connected --run--> Consuming
//!     ^                                          |
//!     +------------- poll failure ---------------+
//!                                                | stop requested
//!                                                v
//!                          Stopped <--shutdown-- Draining
//! ```

use std::time::Duration;

use litterbox_messaging::decode;
use litterbox_types::UsageEvent;
use tracing::{debug, error, info, warn};

use crate::accumulator::{BatchAccumulator, BatchSettings};
use crate::broker::{BrokerError, BrokerSession, DeliveryHandle, Inbound};
use crate::error::PersisterError;
use crate::shutdown::StopSignal;
use crate::writer::{BatchSink, BatchWriter};

/// Where the consumer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// No broker session.
    Disconnected,
    /// A session is attached but the run loop has not started.
    Connected,
    /// The run loop is receiving deliveries.
    Consuming,
    /// A stop was requested; the final batch is being written.
    Draining,
    /// Broker session and store are closed.
    Stopped,
}

/// Tunables for the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Batch flush thresholds.
    pub batch: BatchSettings,
    /// Maximum unacknowledged deliveries held at once.
    pub prefetch: u32,
    /// Bounded wait for deliveries per iteration.
    pub poll_interval: Duration,
    /// Pause at the end of each iteration.
    pub idle_sleep: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch: BatchSettings::default(),
            prefetch: 50,
            poll_interval: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(100),
        }
    }
}

/// Time allowed for one batch write on top of the longest hold.
const WRITE_ALLOWANCE: Duration = Duration::from_secs(30);

impl ConsumerSettings {
    /// How long the broker should wait for a settlement before redelivering.
    ///
    /// A delivery fetched just after a flush is held for up to the batch
    /// timeout plus one loop iteration before its batch is written, so the
    /// ack wait covers that hold plus the write itself.
    pub const fn ack_wait(&self) -> Duration {
        self.batch
            .timeout
            .saturating_add(self.poll_interval)
            .saturating_add(self.idle_sleep)
            .saturating_add(WRITE_ALLOWANCE)
    }
}

/// Running totals, reported on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Deliveries received from the broker, redeliveries included.
    pub received: u64,
    /// Deliveries discarded because they could not be decoded.
    pub malformed: u64,
    /// Write cycles attempted.
    pub batches: u64,
    /// Events committed to the store.
    pub committed: u64,
    /// Deliveries returned to the queue after a failed write.
    pub requeued: u64,
    /// Deliveries dropped because their record was refused by validation.
    pub rejected: u64,
}

/// Drives one broker session into one store.
pub struct ConsumerLoop<B: BrokerSession, S> {
    settings: ConsumerSettings,
    session: Option<B>,
    writer: BatchWriter<S>,
    accumulator: BatchAccumulator<B::Handle>,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl<B: BrokerSession, S: BatchSink> ConsumerLoop<B, S> {
    /// Create a disconnected consumer that writes through `writer`.
    pub fn new(settings: ConsumerSettings, writer: BatchWriter<S>) -> Self {
        if usize::try_from(settings.prefetch).is_ok_and(|p| p < settings.batch.size) {
            warn!(
                prefetch = settings.prefetch,
                batch_size = settings.batch.size,
                "prefetch is below batch size, batches will only flush on timeout"
            );
        }
        Self {
            settings,
            session: None,
            writer,
            accumulator: BatchAccumulator::new(settings.batch),
            state: ConsumerState::Disconnected,
            stats: ConsumerStats::default(),
        }
    }

    /// Hand the consumer a bound broker session.
    pub fn attach(&mut self, session: B) {
        self.session = Some(session);
        self.state = ConsumerState::Connected;
        info!(
            batch_size = self.settings.batch.size,
            batch_timeout_secs = self.settings.batch.timeout.as_secs(),
            prefetch = self.settings.prefetch,
            "consumer connected"
        );
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ConsumerState {
        self.state
    }

    /// Totals so far.
    pub const fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Number of decoded events waiting for the next write cycle.
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    /// Run one loop iteration: wait for deliveries, flush if ready, pause.
    ///
    /// A poll failure requeues the pending batch and leaves the consumer
    /// disconnected; there is no reconnection.
    pub async fn run_once(&mut self) -> Result<(), PersisterError> {
        let max = usize::try_from(self.settings.prefetch).unwrap_or(usize::MAX);
        let wait = self.settings.poll_interval;
        let Some(session) = self.session.as_mut() else {
            return Err(BrokerError::Connection("no broker session attached".to_owned()).into());
        };

        let deliveries = match session.poll(max, wait).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!(error = %e, pending = self.accumulator.len(), "broker lost while consuming");
                self.requeue_pending().await;
                self.state = ConsumerState::Disconnected;
                return Err(e.into());
            }
        };

        if !deliveries.is_empty() {
            debug!(count = deliveries.len(), "deliveries received");
        }
        for inbound in deliveries {
            self.on_delivery(inbound).await;
        }

        if self.accumulator.is_ready() {
            self.write_cycle().await;
        }

        tokio::time::sleep(self.settings.idle_sleep).await;
        Ok(())
    }

    /// Loop until `stop` is raised, then write whatever is still pending.
    pub async fn run(&mut self, stop: &StopSignal) -> Result<(), PersisterError> {
        self.state = ConsumerState::Consuming;
        info!("consuming usage events");

        loop {
            self.run_once().await?;
            if stop.is_stop_requested() {
                break;
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Run until stopped, then shut down whatever the outcome.
    pub async fn serve(mut self, stop: StopSignal) -> Result<ConsumerStats, PersisterError> {
        let result = self.run(&stop).await;
        self.shutdown().await;
        let stats = self.stats;
        info!(
            received = stats.received,
            committed = stats.committed,
            batches = stats.batches,
            malformed = stats.malformed,
            requeued = stats.requeued,
            rejected = stats.rejected,
            "consumer stopped"
        );
        result.map(|()| stats)
    }

    /// Write the pending batch regardless of thresholds.
    async fn drain(&mut self) {
        self.state = ConsumerState::Draining;
        if !self.accumulator.is_empty() {
            info!(pending = self.accumulator.len(), "writing final batch");
            self.write_cycle().await;
        }
    }

    /// Close the broker session, then the store. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        if self.state == ConsumerState::Stopped {
            return;
        }
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.writer.close().await;
        self.state = ConsumerState::Stopped;
        info!("consumer shut down");
    }

    async fn on_delivery(&mut self, inbound: Inbound<B::Handle>) {
        self.stats.received = self.stats.received.saturating_add(1);
        let Inbound { payload, handle } = inbound;

        match decode(&payload) {
            Ok(event) => {
                self.accumulator.offer(event, handle);
                if self.accumulator.is_ready() {
                    self.write_cycle().await;
                }
            }
            Err(e) => {
                let tag = handle.tag();
                warn!(tag, error = %e, "discarding undecodable message");
                self.stats.malformed = self.stats.malformed.saturating_add(1);
                if let Err(e) = handle.reject().await {
                    warn!(error = %e, "reject failed");
                }
            }
        }
    }

    /// Drain the accumulator into the writer and settle every delivery.
    ///
    /// Records refused by validation are rejected individually; the rest
    /// of the batch is written and settled as one.
    pub(crate) async fn write_cycle(&mut self) {
        let drained = self.accumulator.drain();
        if drained.is_empty() {
            return;
        }
        self.stats.batches = self.stats.batches.saturating_add(1);

        let mut events = Vec::with_capacity(drained.len());
        let mut handles = Vec::with_capacity(drained.len());
        for (event, handle) in drained {
            if self.writer.check(&event).is_ok() {
                events.push(event);
                handles.push(handle);
            } else {
                self.stats.rejected = self.stats.rejected.saturating_add(1);
                if let Err(e) = handle.reject().await {
                    warn!(error = %e, "reject failed");
                }
            }
        }
        if events.is_empty() {
            return;
        }
        debug!(size = events.len(), "batch ready");

        match self.writer.write(&events).await {
            Ok(written) => {
                self.stats.committed = self.stats.committed.saturating_add(as_count(written));
                for handle in handles {
                    if let Err(e) = handle.ack().await {
                        warn!(error = %e, "ack failed, delivery will be redelivered");
                    }
                }
                debug!(acked = events.len(), "batch acknowledged");
            }
            Err(e) => {
                self.stats.requeued = self.stats.requeued.saturating_add(as_count(handles.len()));
                settle_requeue(handles).await;
                warn!(error = %e, nacked = events.len(), "batch returned to queue");
            }
        }
    }

    async fn requeue_pending(&mut self) {
        let handles: Vec<B::Handle> = self
            .accumulator
            .drain()
            .into_iter()
            .map(|(_, handle)| handle)
            .collect();
        if handles.is_empty() {
            return;
        }
        self.stats.requeued = self.stats.requeued.saturating_add(as_count(handles.len()));
        settle_requeue(handles).await;
    }
}

impl<B: BrokerSession, S> std::fmt::Debug for ConsumerLoop<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerLoop")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("pending", &self.accumulator.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

async fn settle_requeue<H: DeliveryHandle>(handles: Vec<H>) {
    for handle in handles {
        if let Err(e) = handle.nack_requeue().await {
            warn!(error = %e, "nack failed, delivery will be redelivered after ack wait");
        }
    }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
