//! Simulator configuration, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use litterbox_messaging::BrokerConfig;
use litterbox_types::EdgeDeviceId;

use crate::error::SimulatorError;

/// Device id stamped on generated events unless overridden.
const DEFAULT_EDGE_DEVICE_ID: &str = "12345678-1234-5678-9012-123456789abc";

/// Complete simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Edge device the generated events claim to come from.
    pub device_id: EdgeDeviceId,
    /// Directory fallback and backup files are written to.
    pub fallback_dir: PathBuf,
    /// Previously written fallback file to publish instead of generating.
    pub replay_file: Option<PathBuf>,
    /// How often to check whether the next week is due.
    pub schedule_check: Duration,
    /// Publish the first week and exit.
    pub run_once: bool,
}

impl SimulatorConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `EDGE_DEVICE_ID` -- UUID of the simulated device
    /// - `FALLBACK_DIR` -- where fallback files go (default `.`)
    /// - `REPLAY_FILE` -- publish this fallback file and exit
    /// - `SCHEDULE_CHECK_SECS` -- schedule check interval (default 60)
    /// - `RUN_ONCE` -- exit after the first week (default `false`)
    /// - `BROKER_*` -- see [`BrokerConfig::from_env`]
    pub fn from_env() -> Result<Self, SimulatorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SimulatorError> {
        let broker = BrokerConfig::from_lookup(&lookup)?;

        let device_id: EdgeDeviceId = lookup("EDGE_DEVICE_ID")
            .unwrap_or_else(|| DEFAULT_EDGE_DEVICE_ID.to_owned())
            .parse()
            .map_err(|e| SimulatorError::Config(format!("invalid EDGE_DEVICE_ID: {e}")))?;

        let fallback_dir = lookup("FALLBACK_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from);
        let replay_file = lookup("REPLAY_FILE").map(PathBuf::from);

        let schedule_check_secs: u64 = lookup("SCHEDULE_CHECK_SECS")
            .unwrap_or_else(|| "60".to_owned())
            .parse()
            .map_err(|e| SimulatorError::Config(format!("invalid SCHEDULE_CHECK_SECS: {e}")))?;
        if schedule_check_secs == 0 {
            return Err(SimulatorError::Config(
                "SCHEDULE_CHECK_SECS must be at least 1".to_owned(),
            ));
        }

        let run_once: bool = lookup("RUN_ONCE")
            .unwrap_or_else(|| "false".to_owned())
            .parse()
            .map_err(|e| SimulatorError::Config(format!("invalid RUN_ONCE: {e}")))?;

        Ok(Self {
            broker,
            device_id,
            fallback_dir,
            replay_file,
            schedule_check: Duration::from_secs(schedule_check_secs),
            run_once,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = SimulatorConfig::from_lookup(lookup_from(&[]));
        assert!(config.is_ok());
        if let Ok(config) = config {
            assert_eq!(config.device_id.to_string(), DEFAULT_EDGE_DEVICE_ID);
            assert_eq!(config.fallback_dir, PathBuf::from("."));
            assert!(config.replay_file.is_none());
            assert_eq!(config.schedule_check, Duration::from_secs(60));
            assert!(!config.run_once);
            assert_eq!(config.broker, BrokerConfig::default());
        }
    }

    #[test]
    fn overrides() {
        let config = SimulatorConfig::from_lookup(lookup_from(&[
            ("FALLBACK_DIR", "/var/spool/litterbox"),
            ("REPLAY_FILE", "litterbox_data_20240101_000000.json"),
            ("RUN_ONCE", "true"),
            ("BROKER_HOST", "broker.local"),
        ]));
        assert!(config.is_ok());
        if let Ok(config) = config {
            assert_eq!(config.fallback_dir, PathBuf::from("/var/spool/litterbox"));
            assert_eq!(
                config.replay_file,
                Some(PathBuf::from("litterbox_data_20240101_000000.json"))
            );
            assert!(config.run_once);
            assert_eq!(config.broker.host, "broker.local");
        }
    }

    #[test]
    fn invalid_device_id_is_rejected() {
        let result = SimulatorConfig::from_lookup(lookup_from(&[("EDGE_DEVICE_ID", "cat")]));
        assert!(matches!(result, Err(SimulatorError::Config(_))));
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let result = SimulatorConfig::from_lookup(lookup_from(&[("SCHEDULE_CHECK_SECS", "0")]));
        assert!(matches!(result, Err(SimulatorError::Config(_))));
    }
}
