//! Test doubles for the broker side of the publisher.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, Utc};
use litterbox_types::{EdgeDeviceId, UsageEvent, UsageEventId};

use crate::error::PublishError;
use crate::transport::{Connector, EventTransport};

/// `n` plausible events from one device.
pub fn sample_events(n: usize) -> Vec<UsageEvent> {
    let device = EdgeDeviceId::new();
    let now = Utc::now();
    (0..n)
        .map(|_| UsageEvent {
            id: UsageEventId::new(),
            source_device_id: device,
            enter_time: now - TimeDelta::minutes(3),
            exit_time: now - TimeDelta::minutes(1),
            weight_enter: 38.2,
            weight_exit: 29.7,
            created_at: now,
        })
        .collect()
}

/// A fresh empty directory under the system temp dir.
#[allow(clippy::unwrap_used)]
pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("litterbox-sim-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Connector whose broker is never reachable.
#[derive(Debug, Default)]
pub struct UnreachableConnector {
    attempts: AtomicUsize,
}

impl UnreachableConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Connector for UnreachableConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> Result<MemoryTransport, PublishError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(PublishError::Unreachable("connection refused".to_owned()))
    }
}

#[derive(Debug, Default)]
struct Shared {
    published: Vec<UsageEvent>,
    failing: HashSet<UsageEventId>,
    closes: usize,
}

/// Connector to an in-memory broker that records what it receives.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

#[allow(clippy::unwrap_used)]
impl MemoryConnector {
    /// Refuse the event with this id.
    pub fn fail_for(&self, id: UsageEventId) {
        self.shared.lock().unwrap().failing.insert(id);
    }

    pub fn published(&self) -> Vec<UsageEvent> {
        self.shared.lock().unwrap().published.clone()
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> Result<MemoryTransport, PublishError> {
        Ok(MemoryTransport {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Transport handed out by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
impl EventTransport for MemoryTransport {
    async fn publish(&self, event: &UsageEvent) -> Result<(), PublishError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.failing.contains(&event.id) {
            return Err(PublishError::Broker("no stream response".to_owned()));
        }
        shared.published.push(event.clone());
        Ok(())
    }

    async fn close(&self) {
        self.shared.lock().unwrap().closes += 1;
    }
}
