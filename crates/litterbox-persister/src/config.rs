//! Configuration types for the persister.
//!
//! All configuration is loaded from environment variables. The persister
//! needs to know how to reach the broker and the database, and how to size
//! and time its batches.

use std::time::Duration;

use litterbox_messaging::BrokerConfig;

use crate::accumulator::BatchSettings;
use crate::consumer::ConsumerSettings;
use crate::error::PersisterError;
use crate::writer::RecordValidation;

/// Complete persister configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct PersisterConfig {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Maximum connections in the store pool.
    pub db_max_connections: u32,
    /// Flush a batch once it holds this many events.
    pub batch_size: usize,
    /// Flush a non-empty batch once this much time has passed since the last flush.
    pub batch_timeout: Duration,
    /// Maximum unacknowledged deliveries the broker hands out.
    pub prefetch: u32,
    /// Bounded wait for broker deliveries per loop iteration.
    pub poll_interval: Duration,
    /// Pause between loop iterations.
    pub idle_sleep: Duration,
    /// Whether implausible records are refused before they reach the store.
    pub validation: RecordValidation,
}

impl PersisterConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `DATABASE_URL` -- `PostgreSQL` connection string
    ///
    /// Optional variables:
    /// - `BATCH_SIZE` -- events per batch (default 10)
    /// - `BATCH_TIMEOUT` -- seconds before a partial batch is flushed (default 30)
    /// - `PREFETCH_COUNT` -- max unacknowledged deliveries (default 50)
    /// - `POLL_INTERVAL_MS` -- bounded wait per loop iteration (default 1000)
    /// - `IDLE_SLEEP_MS` -- pause between loop iterations (default 100)
    /// - `VALIDATE_RECORDS` -- refuse implausible records (default `false`)
    /// - `DB_MAX_CONNECTIONS` -- store pool size (default 1)
    /// - `BROKER_*` -- see [`BrokerConfig::from_env`]
    pub fn from_env() -> Result<Self, PersisterError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PersisterError> {
        let broker = BrokerConfig::from_lookup(&lookup)?;

        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            PersisterError::Config("missing required env var DATABASE_URL".to_owned())
        })?;

        let batch_size: usize = parse_or(&lookup, "BATCH_SIZE", 10)?;
        let batch_timeout_secs: u64 = parse_or(&lookup, "BATCH_TIMEOUT", 30)?;
        let prefetch: u32 = parse_or(&lookup, "PREFETCH_COUNT", 50)?;
        let poll_interval_ms: u64 = parse_or(&lookup, "POLL_INTERVAL_MS", 1000)?;
        let idle_sleep_ms: u64 = parse_or(&lookup, "IDLE_SLEEP_MS", 100)?;
        let validate: bool = parse_or(&lookup, "VALIDATE_RECORDS", false)?;
        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 1)?;

        if batch_size == 0 {
            return Err(PersisterError::Config("BATCH_SIZE must be at least 1".to_owned()));
        }
        if prefetch == 0 {
            return Err(PersisterError::Config(
                "PREFETCH_COUNT must be at least 1".to_owned(),
            ));
        }
        if poll_interval_ms == 0 {
            return Err(PersisterError::Config(
                "POLL_INTERVAL_MS must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            broker,
            database_url,
            db_max_connections,
            batch_size,
            batch_timeout: Duration::from_secs(batch_timeout_secs),
            prefetch,
            poll_interval: Duration::from_millis(poll_interval_ms),
            idle_sleep: Duration::from_millis(idle_sleep_ms),
            validation: if validate {
                RecordValidation::RejectImplausible
            } else {
                RecordValidation::Disabled
            },
        })
    }

    /// Settings for the consumer loop.
    pub const fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch: BatchSettings {
                size: self.batch_size,
                timeout: self.batch_timeout,
            },
            prefetch: self.prefetch,
            poll_interval: self.poll_interval,
            idle_sleep: self.idle_sleep,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, PersisterError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PersisterError::Config(format!("invalid {name}: {e}"))),
    }
}
