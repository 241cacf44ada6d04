//! In-memory batch accumulator.
//!
//! Holds decoded events together with their broker delivery handles until
//! either the size threshold or the time threshold is reached. The clock
//! runs from the last drain (or creation), not from the first event added,
//! so an idle stretch followed by a single event flushes that event on the
//! next readiness check.

use std::time::Duration;

use litterbox_types::UsageEvent;
use tokio::time::Instant;

/// When a batch is considered ready to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Flush once this many events are pending.
    pub size: usize,
    /// Flush a non-empty batch once this much time has elapsed since the last drain.
    pub timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Pending events paired with the handles needed to settle their deliveries.
#[derive(Debug)]
pub struct BatchAccumulator<H> {
    settings: BatchSettings,
    pending: Vec<(UsageEvent, H)>,
    started_at: Instant,
}

impl<H> BatchAccumulator<H> {
    /// Create an empty accumulator whose clock starts now.
    pub fn new(settings: BatchSettings) -> Self {
        Self {
            settings,
            pending: Vec::with_capacity(settings.size),
            started_at: Instant::now(),
        }
    }

    /// Append an event and its delivery handle, preserving arrival order.
    pub fn offer(&mut self, event: UsageEvent, handle: H) {
        self.pending.push((event, handle));
    }

    /// Whether the batch should be flushed right now.
    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    /// Whether the batch should be flushed at `now`.
    ///
    /// An empty batch is never ready.
    pub fn is_ready_at(&self, now: Instant) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.len() >= self.settings.size
            || now.saturating_duration_since(self.started_at) >= self.settings.timeout
    }

    /// Take every pending entry in arrival order and restart the clock.
    pub fn drain(&mut self) -> Vec<(UsageEvent, H)> {
        self.started_at = Instant::now();
        std::mem::take(&mut self.pending)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
