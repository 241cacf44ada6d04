//! Litterbox edge device simulator.
//!
//! Generates a week of synthetic usage for one device and publishes it to
//! the broker, then keeps producing one week at a time as each elapses.
//! Whatever the broker does not accept ends up in a local JSON file.
//!
//! # Modes
//!
//! - default: publish the past week, then follow the weekly schedule
//! - `RUN_ONCE=true`: publish the past week and exit
//! - `REPLAY_FILE=<path>`: republish a fallback file and exit

mod config;
mod error;
mod fallback;
mod generator;
mod publisher;
mod schedule;
#[cfg(test)]
mod testing;
mod transport;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::SimulatorConfig;
use crate::error::SimulatorError;
use crate::fallback::read_fallback;
use crate::publisher::Publisher;
use crate::schedule::WeekSchedule;
use crate::transport::{Connector, JetStreamConnector};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a replay file cannot be
/// read, or a fallback file cannot be written.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("litterbox-simulator starting");

    let config = SimulatorConfig::from_env()?;
    info!(
        device_id = %config.device_id,
        broker = config.broker.url(),
        fallback_dir = %config.fallback_dir.display(),
        "configuration loaded"
    );

    let publisher = Publisher::new(
        JetStreamConnector::new(config.broker.clone()),
        config.fallback_dir.clone(),
    );

    if let Some(path) = &config.replay_file {
        let events = read_fallback(path).await?;
        info!(path = %path.display(), records = events.len(), "replaying fallback file");
        let summary = publisher.publish_batch(&events).await?;
        info!(published = summary.published, failed = summary.failed, "replay finished");
        return Ok(());
    }

    let mut rng = rand::rng();
    let mut schedule = WeekSchedule::starting(Utc::now());
    publish_week(&publisher, &mut rng, &config, schedule.current_week_start()).await?;

    if config.run_once {
        return Ok(());
    }

    let mut interval = tokio::time::interval(config.schedule_check);
    interval.tick().await;
    info!(
        check_secs = config.schedule_check.as_secs(),
        "simulator scheduled, press Ctrl+C to stop"
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("simulator stopped by user");
                break;
            }
            _ = interval.tick() => {
                if let Some(week_start) = schedule.advance_if_due(Utc::now()) {
                    publish_week(&publisher, &mut rng, &config, week_start).await?;
                }
            }
        }
    }

    Ok(())
}

/// Generate and publish the week starting at `week_start`.
async fn publish_week<C: Connector>(
    publisher: &Publisher<C>,
    rng: &mut impl Rng,
    config: &SimulatorConfig,
    week_start: DateTime<Utc>,
) -> Result<(), SimulatorError> {
    let events = generator::generate_week(rng, config.device_id, week_start);
    let summary = publisher.publish_batch(&events).await?;
    info!(
        %week_start,
        connected = summary.connected,
        published = summary.published,
        failed = summary.failed,
        file = ?summary.file,
        "week processed"
    );
    Ok(())
}
