//! Litterbox usage persister.
//!
//! Consumes usage events from the broker queue, batches them, and writes
//! each batch to `PostgreSQL` in one transaction. Deliveries are
//! acknowledged only after their batch has committed, so a crash at any
//! point leads to redelivery rather than loss.
//!
//! # Architecture
//!
//! ```text
//! JetStream queue --> decode --> BatchAccumulator --> BatchWriter --> PostgreSQL
//!        ^                                                 |
//!        +------------------ ack / nack / reject ----------+
//! ```
//!
//! Several persister processes may bind to the same durable queue; the
//! broker spreads deliveries between them and the store's duplicate check
//! catches any record committed twice.

mod accumulator;
mod broker;
mod config;
mod consumer;
mod error;
mod shutdown;
#[cfg(test)]
mod testing;
mod writer;

use litterbox_db::{PostgresConfig, PostgresPool, UsageStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::broker::JetStreamSession;
use crate::config::PersisterConfig;
use crate::consumer::ConsumerLoop;
use crate::shutdown::{StopSignal, listen_for_signals};
use crate::writer::BatchWriter;

/// Application entry point.
///
/// Initializes logging, loads configuration, prepares the store, binds to
/// the broker queue and consumes until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the store or the broker cannot be reached at
/// startup, or if the broker is lost while consuming.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("litterbox-persister starting");

    let config = PersisterConfig::from_env()?;
    info!(
        broker = config.broker.url(),
        batch_size = config.batch_size,
        batch_timeout_secs = config.batch_timeout.as_secs(),
        prefetch = config.prefetch,
        validation = ?config.validation,
        "configuration loaded"
    );

    // Store first: there is no point taking deliveries we cannot write.
    let pool = PostgresPool::connect(
        &PostgresConfig::new(&config.database_url).with_max_connections(config.db_max_connections),
    )
    .await?;
    pool.run_migrations().await?;
    let store = UsageStore::new(pool);

    let settings = config.consumer_settings();
    let writer = BatchWriter::new(store.clone(), config.validation);
    let mut consumer = ConsumerLoop::new(settings, writer);

    let session = match JetStreamSession::connect(
        &config.broker,
        settings.prefetch,
        settings.ack_wait(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "broker unavailable at startup");
            store.close().await;
            return Err(e.into());
        }
    };
    consumer.attach(session);

    let stop = StopSignal::new();
    listen_for_signals(stop.clone());

    let stats = consumer.serve(stop).await?;
    info!(committed = stats.committed, "litterbox-persister stopped");
    Ok(())
}
