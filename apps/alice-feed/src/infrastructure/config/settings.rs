//! Feed Configuration Settings
//!
//! Configuration for the feed binary, loaded from environment variables.
//!
//! | Variable                          | Default                        |
//! |-----------------------------------|--------------------------------|
//! | `ALICE_USER_ID`                   | required                       |
//! | `ALICE_SESSION_ID`                | required                       |
//! | `ALICE_FEED_PROTOCOL`             | `json`                         |
//! | `ALICE_FEED_URL`                  | protocol endpoint              |
//! | `ALICE_HEARTBEAT_INTERVAL_SECS`   | 3 (json) / 10 (binary)         |
//! | `ALICE_IDLE_TIMEOUT_SECS`         | disabled                       |
//! | `ALICE_RECONNECT_DELAY_MS`        | 100                            |
//! | `ALICE_RECONNECT_DELAY_MAX_MS`    | reconnect delay                |
//! | `ALICE_RECONNECT_MULTIPLIER`      | 1.0                            |
//! | `ALICE_MAX_RECONNECT_ATTEMPTS`    | 0 (unlimited)                  |
//! | `ALICE_SEND_POLL_MS`              | 50                             |
//! | `ALICE_MESSAGE_LOG_CAPACITY`      | 1000                           |
//! | `ALICE_CONTRACT_FILES`            | none                           |
//! | `ALICE_SUBSCRIBE`                 | none                           |
//! | `ALICE_SUBSCRIBE_MODE`            | `tick`                         |
//! | `ALICE_METRICS_ADDR`              | none (no listener)             |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::SessionCredentials;
use crate::application::services::DEFAULT_MESSAGE_LOG_CAPACITY;
use crate::domain::instrument::InstrumentKey;
use crate::domain::streaming::FeedMode;
use crate::infrastructure::aliceblue::client::{DEFAULT_SEND_POLL_INTERVAL, FeedClientConfig};
use crate::infrastructure::aliceblue::heartbeat::HeartbeatConfig;
use crate::infrastructure::aliceblue::protocol::ProtocolKind;
use crate::infrastructure::aliceblue::reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig};

/// Connection timing settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Interval between heartbeat messages.
    pub heartbeat_interval: Duration,
    /// Inbound silence that forces a reconnect.
    pub idle_timeout: Option<Duration>,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier (1.0 = fixed delay).
    pub reconnect_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Interval at which blocked senders re-check the connection.
    pub send_poll_interval: Duration,
}

impl ConnectionSettings {
    /// Defaults for a protocol.
    #[must_use]
    pub const fn for_protocol(kind: ProtocolKind) -> Self {
        Self {
            heartbeat_interval: kind.default_heartbeat_interval(),
            idle_timeout: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY,
            reconnect_multiplier: 1.0,
            max_reconnect_attempts: 0,
            send_poll_interval: DEFAULT_SEND_POLL_INTERVAL,
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Session credentials.
    pub credentials: SessionCredentials,
    /// Wire protocol.
    pub protocol: ProtocolKind,
    /// Endpoint URL template.
    pub url: String,
    /// Connection timing.
    pub connection: ConnectionSettings,
    /// Entries kept in each segment message log.
    pub message_log_capacity: usize,
    /// Master contract files to load into the directory.
    pub contract_files: Vec<PathBuf>,
    /// Instruments to subscribe at startup.
    pub subscribe: Vec<InstrumentKey>,
    /// Mode for startup subscriptions.
    pub subscribe_mode: FeedMode,
    /// Address for the Prometheus listener.
    pub metrics_addr: Option<SocketAddr>,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or a value cannot
    /// be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration through a variable lookup.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FeedConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let user_id = env.required("ALICE_USER_ID")?;
        let session_id = env.required("ALICE_SESSION_ID")?;

        let protocol = env
            .parse_with("ALICE_FEED_PROTOCOL", |v| v.parse::<ProtocolKind>())?
            .unwrap_or_default();
        let url = env
            .get("ALICE_FEED_URL")
            .unwrap_or_else(|| protocol.default_url().to_string());

        let defaults = ConnectionSettings::for_protocol(protocol);
        let reconnect_delay = env
            .parse::<u64>("ALICE_RECONNECT_DELAY_MS")?
            .map_or(defaults.reconnect_delay, Duration::from_millis);
        let connection = ConnectionSettings {
            heartbeat_interval: env
                .parse::<u64>("ALICE_HEARTBEAT_INTERVAL_SECS")?
                .map_or(defaults.heartbeat_interval, Duration::from_secs),
            idle_timeout: env
                .parse::<u64>("ALICE_IDLE_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            reconnect_delay,
            reconnect_delay_max: env
                .parse::<u64>("ALICE_RECONNECT_DELAY_MAX_MS")?
                .map_or(reconnect_delay, Duration::from_millis),
            reconnect_multiplier: env
                .parse::<f64>("ALICE_RECONNECT_MULTIPLIER")?
                .unwrap_or(defaults.reconnect_multiplier),
            max_reconnect_attempts: env
                .parse::<u32>("ALICE_MAX_RECONNECT_ATTEMPTS")?
                .unwrap_or(defaults.max_reconnect_attempts),
            send_poll_interval: env
                .parse::<u64>("ALICE_SEND_POLL_MS")?
                .map_or(defaults.send_poll_interval, Duration::from_millis),
        };

        let contract_files = env
            .list("ALICE_CONTRACT_FILES")
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let subscribe = env
            .list("ALICE_SUBSCRIBE")
            .iter()
            .map(|key| {
                key.parse::<InstrumentKey>()
                    .map_err(|e| ConfigError::invalid("ALICE_SUBSCRIBE", key, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            credentials: SessionCredentials::new(user_id, session_id),
            protocol,
            url,
            connection,
            message_log_capacity: env
                .parse::<usize>("ALICE_MESSAGE_LOG_CAPACITY")?
                .unwrap_or(DEFAULT_MESSAGE_LOG_CAPACITY),
            contract_files,
            subscribe,
            subscribe_mode: env
                .parse_with("ALICE_SUBSCRIBE_MODE", |v| v.parse::<FeedMode>())?
                .unwrap_or(FeedMode::Tick),
            metrics_addr: env.parse::<SocketAddr>("ALICE_METRICS_ADDR")?,
        })
    }

    /// Build the client configuration.
    #[must_use]
    pub fn client_config(&self) -> FeedClientConfig {
        let connection = &self.connection;
        let reconnect = ReconnectConfig::exponential(
            connection.reconnect_delay,
            connection.reconnect_delay_max.max(connection.reconnect_delay),
            connection.reconnect_multiplier,
            0.0,
        )
        .with_max_attempts(connection.max_reconnect_attempts);

        FeedClientConfig {
            url: self.url.clone(),
            heartbeat: HeartbeatConfig::new(connection.heartbeat_interval, connection.idle_timeout),
            reconnect,
            send_poll_interval: connection.send_poll_interval,
            message_log_capacity: self.message_log_capacity,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Lookup helper treating blank values as unset.
struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Err(ConfigError::MissingEnvVar(key.to_string())),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse_with(key, |v| v.parse::<T>())
    }

    fn parse_with<T, E: std::fmt::Display>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|v| parse(&v).map_err(|e| ConfigError::invalid(key, &v, e)))
            .transpose()
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::instrument::Exchange;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] =
        [("ALICE_USER_ID", "AB123"), ("ALICE_SESSION_ID", "secret")];

    #[test]
    fn defaults_for_json() {
        let config = FeedConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        assert_eq!(config.protocol, ProtocolKind::Json);
        assert_eq!(config.url, ProtocolKind::Json.default_url());
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.connection.reconnect_delay, Duration::from_millis(100));
        assert_eq!(config.connection.send_poll_interval, Duration::from_millis(50));
        assert!(config.connection.idle_timeout.is_none());
        assert_eq!(config.message_log_capacity, 1000);
        assert!(config.contract_files.is_empty());
        assert!(config.subscribe.is_empty());
        assert_eq!(config.subscribe_mode, FeedMode::Tick);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn binary_protocol_changes_defaults() {
        let mut vars = CREDENTIALS.to_vec();
        vars.push(("ALICE_FEED_PROTOCOL", "Binary"));
        let config = FeedConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.protocol, ProtocolKind::Binary);
        assert!(config.url.contains("{token}"));
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(10));
    }

    #[test]
    fn missing_and_empty_credentials() {
        let result = FeedConfig::from_lookup(lookup(&[("ALICE_USER_ID", "AB123")]));
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(key)) if key == "ALICE_SESSION_ID")
        );

        let result = FeedConfig::from_lookup(lookup(&[
            ("ALICE_USER_ID", " "),
            ("ALICE_SESSION_ID", "secret"),
        ]));
        assert!(matches!(result, Err(ConfigError::EmptyValue(key)) if key == "ALICE_USER_ID"));
    }

    #[test]
    fn parses_lists_and_overrides() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("ALICE_SUBSCRIBE", "NSE|1594, nfo|35001,"),
            ("ALICE_SUBSCRIBE_MODE", "depth"),
            ("ALICE_CONTRACT_FILES", "/tmp/NSE.json,/tmp/NFO.json"),
            ("ALICE_IDLE_TIMEOUT_SECS", "30"),
            ("ALICE_RECONNECT_DELAY_MS", "250"),
            ("ALICE_METRICS_ADDR", "127.0.0.1:9100"),
        ]);
        let config = FeedConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(
            config.subscribe,
            vec![
                InstrumentKey::new(Exchange::Nse, 1594),
                InstrumentKey::new(Exchange::Nfo, 35001)
            ]
        );
        assert_eq!(config.subscribe_mode, FeedMode::Depth);
        assert_eq!(config.contract_files.len(), 2);
        assert_eq!(config.connection.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connection.reconnect_delay_max, Duration::from_millis(250));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));

        let client = config.client_config();
        assert_eq!(client.heartbeat.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(client.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(client.message_log_capacity, 1000);
    }

    #[test]
    fn rejects_invalid_values() {
        for (key, value) in [
            ("ALICE_FEED_PROTOCOL", "xml"),
            ("ALICE_SUBSCRIBE", "NSE-1594"),
            ("ALICE_SUBSCRIBE_MODE", "everything"),
            ("ALICE_SEND_POLL_MS", "soon"),
        ] {
            let mut vars = CREDENTIALS.to_vec();
            vars.push((key, value));
            let result = FeedConfig::from_lookup(lookup(&vars));
            assert!(
                matches!(&result, Err(ConfigError::InvalidValue { key: k, .. }) if k == key),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let config = FeedConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
