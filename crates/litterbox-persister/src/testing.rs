//! In-memory doubles for the store and the broker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use litterbox_db::DbError;
use litterbox_types::{EdgeDeviceId, UsageEvent, UsageEventId};
use tokio::time::Instant;

use crate::broker::{BrokerError, BrokerSession, DeliveryHandle, Inbound};
use crate::writer::BatchSink;

/// A plausible event with fresh ids.
pub fn sample_event() -> UsageEvent {
    let now = Utc::now();
    UsageEvent {
        id: UsageEventId::new(),
        source_device_id: EdgeDeviceId::new(),
        enter_time: now - TimeDelta::minutes(10),
        exit_time: now - TimeDelta::minutes(8),
        weight_enter: 12.4,
        weight_exit: 12.1,
        created_at: now,
    }
}

#[derive(Debug, Default)]
struct StoreState {
    rows: Vec<UsageEvent>,
    failing: bool,
    insert_calls: usize,
    close_calls: usize,
}

/// Store double with the same all-or-nothing dedup semantics as `UsageStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

#[allow(clippy::unwrap_used)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail as if the database were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn seed(&self, event: UsageEvent) {
        self.state.lock().unwrap().rows.push(event);
    }

    pub fn rows(&self) -> Vec<UsageEvent> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn insert_calls(&self) -> usize {
        self.state.lock().unwrap().insert_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }
}

#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
impl BatchSink for MemoryStore {
    async fn insert_batch(&self, events: &[UsageEvent]) -> Result<usize, DbError> {
        let mut state = self.state.lock().unwrap();
        state.insert_calls += 1;
        if state.failing {
            return Err(DbError::Closed);
        }
        let mut staged: Vec<UsageEvent> = Vec::with_capacity(events.len());
        for event in events {
            let exists = state.rows.iter().chain(staged.iter()).any(|r| r.id == event.id);
            if exists {
                return Err(DbError::DuplicateRecord(event.id));
            }
            staged.push(event.clone());
        }
        let written = staged.len();
        state.rows.extend(staged);
        Ok(written)
    }

    async fn close(&self) {
        self.state.lock().unwrap().close_calls += 1;
    }
}

/// A delivery handed out and not yet settled.
#[derive(Debug)]
struct Unsettled {
    delivery: u64,
    payload: Vec<u8>,
    deadline: Option<Instant>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queue: VecDeque<(u64, Vec<u8>)>,
    unsettled: HashMap<u64, Unsettled>,
    next_tag: u64,
    next_delivery: u64,
    prefetch: usize,
    ack_wait: Option<Duration>,
    acked: Vec<u64>,
    requeued: Vec<u64>,
    rejected: Vec<u64>,
    redelivered: Vec<u64>,
    fail_next_poll: bool,
    close_calls: usize,
}

impl BrokerState {
    /// Put every delivery whose ack wait ran out back on the queue.
    fn expire(&mut self, now: Instant) {
        let mut expired: Vec<u64> = self
            .unsettled
            .iter()
            .filter(|(_, u)| u.deadline.is_some_and(|d| d <= now))
            .map(|(tag, _)| *tag)
            .collect();
        expired.sort_unstable();
        for tag in expired {
            if let Some(unsettled) = self.unsettled.remove(&tag) {
                self.redelivered.push(tag);
                self.queue.push_back((tag, unsettled.payload));
            }
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.unsettled.values().filter_map(|u| u.deadline).min()
    }

    /// Remove the delivery if `delivery` is still its current one.
    /// Settling a delivery the broker already gave up on does nothing.
    fn settle(&mut self, tag: u64, delivery: u64) -> Option<Vec<u8>> {
        if self.unsettled.get(&tag).is_some_and(|u| u.delivery == delivery) {
            self.unsettled.remove(&tag).map(|u| u.payload)
        } else {
            None
        }
    }
}

/// Queue double. Deliveries beyond the prefetch limit wait until earlier
/// ones are settled; requeued deliveries go to the back of the queue.
/// With an ack wait, a delivery left unsettled that long is redelivered.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
impl MemoryBroker {
    pub fn new(prefetch: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                prefetch,
                next_tag: 1,
                ..BrokerState::default()
            })),
        }
    }

    pub fn with_ack_wait(prefetch: usize, ack_wait: Duration) -> Self {
        let broker = Self::new(prefetch);
        broker.state.lock().unwrap().ack_wait = Some(ack_wait);
        broker
    }

    /// Enqueue an encoded event, returning its delivery tag.
    pub fn publish(&self, event: &UsageEvent) -> u64 {
        self.publish_raw(litterbox_messaging::encode(event).unwrap())
    }

    /// Enqueue arbitrary bytes, returning the delivery tag.
    pub fn publish_raw(&self, payload: Vec<u8>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let tag = state.next_tag;
        state.next_tag += 1;
        state.queue.push_back((tag, payload));
        tag
    }

    pub fn session(&self) -> MemorySession {
        MemorySession {
            state: Arc::clone(&self.state),
        }
    }

    pub fn fail_next_poll(&self) {
        self.state.lock().unwrap().fail_next_poll = true;
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().unwrap().acked.clone()
    }

    pub fn requeued(&self) -> Vec<u64> {
        self.state.lock().unwrap().requeued.clone()
    }

    pub fn rejected(&self) -> Vec<u64> {
        self.state.lock().unwrap().rejected.clone()
    }

    /// Tags put back on the queue because their ack wait ran out.
    pub fn redelivered(&self) -> Vec<u64> {
        self.state.lock().unwrap().redelivered.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().unsettled.len()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }
}

/// Session over a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<BrokerState>>,
}

#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
impl BrokerSession for MemorySession {
    type Handle = MemoryHandle;

    async fn poll(
        &mut self,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<Inbound<MemoryHandle>>, BrokerError> {
        let expires = Instant::now() + wait;
        loop {
            let next_expiry = {
                let mut state = self.state.lock().unwrap();
                if state.fail_next_poll {
                    state.fail_next_poll = false;
                    return Err(BrokerError::Fetch("connection reset".to_owned()));
                }
                let now = Instant::now();
                state.expire(now);

                let room = state.prefetch.saturating_sub(state.unsettled.len()).min(max);
                let mut delivered = Vec::new();
                while delivered.len() < room {
                    let Some((tag, payload)) = state.queue.pop_front() else {
                        break;
                    };
                    let delivery = state.next_delivery;
                    state.next_delivery += 1;
                    let deadline = state.ack_wait.map(|w| now + w);
                    state.unsettled.insert(
                        tag,
                        Unsettled {
                            delivery,
                            payload: payload.clone(),
                            deadline,
                        },
                    );
                    delivered.push(Inbound {
                        payload,
                        handle: MemoryHandle {
                            tag,
                            delivery,
                            state: Arc::clone(&self.state),
                        },
                    });
                }
                if !delivered.is_empty() {
                    return Ok(delivered);
                }
                state.next_expiry()
            };

            // Nothing to hand out: wait for the pull to expire, or for an
            // unsettled delivery to come due, whichever is first.
            if Instant::now() >= expires {
                return Ok(Vec::new());
            }
            let until = next_expiry.map_or(expires, |e| e.min(expires));
            tokio::time::sleep_until(until).await;
        }
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().close_calls += 1;
    }
}

/// Handle for one in-memory delivery.
#[derive(Debug)]
pub struct MemoryHandle {
    tag: u64,
    delivery: u64,
    state: Arc<Mutex<BrokerState>>,
}

#[allow(clippy::unwrap_used)]
impl DeliveryHandle for MemoryHandle {
    fn tag(&self) -> u64 {
        self.tag
    }

    async fn ack(self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if state.settle(self.tag, self.delivery).is_some() {
            state.acked.push(self.tag);
        }
        Ok(())
    }

    async fn nack_requeue(self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(payload) = state.settle(self.tag, self.delivery) {
            state.requeued.push(self.tag);
            state.queue.push_back((self.tag, payload));
        }
        Ok(())
    }

    async fn reject(self) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        if state.settle(self.tag, self.delivery).is_some() {
            state.rejected.push(self.tag);
        }
        Ok(())
    }
}
