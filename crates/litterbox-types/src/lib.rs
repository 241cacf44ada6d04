//! Shared type definitions for the litterbox usage pipeline.
//!
//! Every stage of the pipeline (simulator, broker codec, persister, store)
//! carries the same [`UsageEvent`] value end to end. Untyped payloads are
//! only tolerated at the wire boundary in `litterbox-messaging`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for event and device identifiers
//! - [`usage`] -- The usage event record and its plausibility checks

pub mod ids;
pub mod usage;

pub use ids::{EdgeDeviceId, UsageEventId};
pub use usage::{Implausibility, UsageEvent};
