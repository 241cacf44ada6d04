//! The usage event record.
//!
//! A [`UsageEvent`] is one litterbox visit as observed by an edge device:
//! the weight on the scale when the cat entered and when it left. Records
//! are immutable once created and are only ever inserted into the store,
//! never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EdgeDeviceId, UsageEventId};

/// One litterbox visit recorded by an edge device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event id, assigned by the producer. Used as the idempotency key.
    pub id: UsageEventId,
    /// The device that observed the visit.
    #[serde(rename = "litterbox_edge_device_id")]
    pub source_device_id: EdgeDeviceId,
    /// When the cat stepped into the litterbox.
    pub enter_time: DateTime<Utc>,
    /// When the cat stepped out of the litterbox.
    pub exit_time: DateTime<Utc>,
    /// Scale reading on entry (pounds, one decimal place by convention).
    pub weight_enter: f64,
    /// Scale reading on exit (pounds, one decimal place by convention).
    pub weight_exit: f64,
    /// When the producer created the record (not when it was persisted).
    pub created_at: DateTime<Utc>,
}

/// A physically impossible combination of readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implausibility {
    /// The visit ends before it starts.
    ExitBeforeEnter,
    /// The box got heavier once the cat left.
    ExitHeavierThanEnter,
}

impl core::fmt::Display for Implausibility {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ExitBeforeEnter => f.write_str("exit_time precedes enter_time"),
            Self::ExitHeavierThanEnter => f.write_str("weight_exit exceeds weight_enter"),
        }
    }
}

impl UsageEvent {
    /// Return the first physical inconsistency in this record, if any.
    ///
    /// Nothing in the pipeline enforces these rules by default; callers
    /// opt in (see the persister's record validation policy).
    pub fn implausibility(&self) -> Option<Implausibility> {
        if self.exit_time < self.enter_time {
            return Some(Implausibility::ExitBeforeEnter);
        }
        if self.weight_exit > self.weight_enter {
            return Some(Implausibility::ExitHeavierThanEnter);
        }
        None
    }
}
