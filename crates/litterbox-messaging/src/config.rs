//! Broker connection settings.
//!
//! Loaded from environment variables, following the same conventions for
//! the producer and the consumer so both sides agree on where the broker is.

use std::time::Duration;

use crate::error::MessagingError;

/// Default broker host.
const DEFAULT_HOST: &str = "localhost";

/// Default broker port (NATS client port).
const DEFAULT_PORT: u16 = 4222;

/// Default virtual host. `/` selects the default JetStream domain.
const DEFAULT_VHOST: &str = "/";

/// Default connection timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Where and how to reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker client port.
    pub port: u16,
    /// Virtual host, mapped onto a JetStream domain. `/` or empty means default.
    pub vhost: String,
    /// Optional `(user, password)` credentials.
    pub credentials: Option<(String, String)>,
    /// How long to wait for the initial connection.
    pub connect_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            vhost: DEFAULT_VHOST.to_owned(),
            credentials: None,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl BrokerConfig {
    /// Load broker settings from environment variables.
    ///
    /// Optional variables:
    /// - `BROKER_HOST` -- broker host (default `localhost`)
    /// - `BROKER_PORT` -- broker port (default `4222`)
    /// - `BROKER_VHOST` -- virtual host / JetStream domain (default `/`)
    /// - `BROKER_USER` and `BROKER_PASSWORD` -- credentials, both or neither
    /// - `BROKER_CONNECT_TIMEOUT_MS` -- initial connect timeout (default `5000`)
    pub fn from_env() -> Result<Self, MessagingError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load broker settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MessagingError> {
        let host = lookup("BROKER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());

        let port: u16 = lookup("BROKER_PORT")
            .unwrap_or_else(|| DEFAULT_PORT.to_string())
            .parse()
            .map_err(|e| MessagingError::Config(format!("invalid BROKER_PORT: {e}")))?;

        let vhost = lookup("BROKER_VHOST").unwrap_or_else(|| DEFAULT_VHOST.to_owned());

        let credentials = match (lookup("BROKER_USER"), lookup("BROKER_PASSWORD")) {
            (Some(user), Some(password)) => Some((user, password)),
            (None, None) => None,
            _ => {
                return Err(MessagingError::Config(
                    "BROKER_USER and BROKER_PASSWORD must be set together".to_owned(),
                ));
            }
        };

        let connect_timeout_ms: u64 = lookup("BROKER_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|| DEFAULT_CONNECT_TIMEOUT_MS.to_string())
            .parse()
            .map_err(|e| {
                MessagingError::Config(format!("invalid BROKER_CONNECT_TIMEOUT_MS: {e}"))
            })?;

        Ok(Self {
            host,
            port,
            vhost,
            credentials,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
        })
    }

    /// Server address in `nats://host:port` form.
    pub fn url(&self) -> String {
        format!("nats://{}:{}", self.host, self.port)
    }

    /// JetStream domain selected by the virtual host, if not the default.
    pub fn domain(&self) -> Option<&str> {
        let domain = self.vhost.trim_matches('/');
        if domain.is_empty() { None } else { Some(domain) }
    }
}
