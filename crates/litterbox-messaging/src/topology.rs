//! Broker topology shared by the producer and the consumer.
//!
//! | Name | Kind | Notes |
//! |------|------|-------|
//! | `litterbox_events` | stream | file storage, captures `litterbox.>` |
//! | `litterbox.usage` | subject | every usage event is published here |
//! | `litterbox_usage_queue` | durable pull consumer | explicit ack, bounded by `max_ack_pending` |

use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, IntoConsumerConfig, pull};
use async_nats::jetstream::stream::{self, StorageType};
use litterbox_types::UsageEvent;

use crate::codec::CONTENT_TYPE;

/// Name of the durable stream the producer publishes into.
pub const EXCHANGE_NAME: &str = "litterbox_events";

/// Subjects captured by the stream.
pub const EXCHANGE_SUBJECTS: &str = "litterbox.>";

/// Subject (routing key) usage events are published on and filtered by.
pub const ROUTING_KEY: &str = "litterbox.usage";

/// Name of the durable consumer shared by all persister instances.
pub const QUEUE_NAME: &str = "litterbox_usage_queue";

/// Value of the [`HEADER_DATA_TYPE`] header for usage events.
pub const DATA_TYPE_USAGE: &str = "litterbox_usage";

/// Header carrying the unique message identifier (also used by the
/// stream's duplicate window).
pub const HEADER_MESSAGE_ID: &str = "Nats-Msg-Id";

/// Header carrying the codec's media type.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Header naming the edge device that produced the event.
pub const HEADER_EDGE_DEVICE_ID: &str = "edge_device_id";

/// Header tagging the kind of data carried.
pub const HEADER_DATA_TYPE: &str = "data_type";

/// Stream configuration for the durable `litterbox_events` stream.
pub fn exchange_config() -> stream::Config {
    stream::Config {
        name: EXCHANGE_NAME.to_owned(),
        subjects: vec![EXCHANGE_SUBJECTS.to_owned()],
        storage: StorageType::File,
        ..Default::default()
    }
}

/// Durable consumer configuration for `litterbox_usage_queue`.
///
/// `prefetch` bounds how many deliveries may be outstanding (unacked)
/// across every instance bound to the queue. `ack_wait` is how long the
/// broker waits for a settlement before redelivering; it must outlast the
/// longest time a consumer holds a delivery in a pending batch.
pub fn queue_config(prefetch: u32, ack_wait: Duration) -> pull::Config {
    pull::Config {
        durable_name: Some(QUEUE_NAME.to_owned()),
        filter_subject: ROUTING_KEY.to_owned(),
        deliver_policy: DeliverPolicy::All,
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        max_ack_pending: i64::from(prefetch),
        ..Default::default()
    }
}

/// Whether an existing durable consumer still matches the requested
/// flow-control settings.
pub fn queue_matches(existing: impl IntoConsumerConfig, requested: &pull::Config) -> bool {
    let existing = existing.into_consumer_config();
    existing.max_ack_pending == requested.max_ack_pending && existing.ack_wait == requested.ack_wait
}

/// Build the headers stamped on a published usage event.
pub fn usage_headers(event: &UsageEvent) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_MESSAGE_ID, event.id.to_string().as_str());
    headers.insert(HEADER_CONTENT_TYPE, CONTENT_TYPE);
    headers.insert(
        HEADER_EDGE_DEVICE_ID,
        event.source_device_id.to_string().as_str(),
    );
    headers.insert(HEADER_DATA_TYPE, DATA_TYPE_USAGE);
    headers
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use litterbox_types::{EdgeDeviceId, UsageEventId};

    use super::*;

    #[test]
    fn queue_filter_is_covered_by_exchange_subjects() {
        let prefix = EXCHANGE_SUBJECTS.trim_end_matches('>');
        assert!(ROUTING_KEY.starts_with(prefix));
    }

    #[test]
    fn queue_config_is_durable_with_explicit_ack() {
        let config = queue_config(50, Duration::from_secs(90));
        assert_eq!(config.durable_name.as_deref(), Some(QUEUE_NAME));
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.max_ack_pending, 50);
        assert_eq!(config.filter_subject, ROUTING_KEY);
    }

    #[test]
    fn queue_config_sets_ack_wait_explicitly() {
        let config = queue_config(50, Duration::from_secs(90));
        assert_eq!(config.ack_wait, Duration::from_secs(90));
    }

    #[test]
    fn changed_prefetch_or_ack_wait_is_a_mismatch() {
        let current = queue_config(50, Duration::from_secs(90));
        assert!(queue_matches(&current, &queue_config(50, Duration::from_secs(90))));
        assert!(!queue_matches(&current, &queue_config(20, Duration::from_secs(90))));
        assert!(!queue_matches(&current, &queue_config(50, Duration::from_secs(120))));
    }

    #[test]
    fn exchange_is_file_backed() {
        let config = exchange_config();
        assert_eq!(config.name, EXCHANGE_NAME);
        assert_eq!(config.storage, StorageType::File);
    }

    #[test]
    fn headers_identify_message_and_device() {
        let event = UsageEvent {
            id: UsageEventId::new(),
            source_device_id: EdgeDeviceId::new(),
            enter_time: Utc::now(),
            exit_time: Utc::now(),
            weight_enter: 40.0,
            weight_exit: 31.0,
            created_at: Utc::now(),
        };
        let headers = usage_headers(&event);
        assert_eq!(
            headers.get(HEADER_MESSAGE_ID).map(|v| v.as_str().to_owned()),
            Some(event.id.to_string())
        );
        assert_eq!(
            headers.get(HEADER_EDGE_DEVICE_ID).map(|v| v.as_str().to_owned()),
            Some(event.source_device_id.to_string())
        );
        assert_eq!(
            headers.get(HEADER_CONTENT_TYPE).map(|v| v.as_str().to_owned()),
            Some(CONTENT_TYPE.to_owned())
        );
        assert_eq!(
            headers.get(HEADER_DATA_TYPE).map(|v| v.as_str().to_owned()),
            Some(DATA_TYPE_USAGE.to_owned())
        );
    }
}
