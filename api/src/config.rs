//! Server and hub configuration.
//!
//! Values come from the environment (see [`ServerConfig::from_env`]) and fall
//! back to the defaults below.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the realtime hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,

    /// Maximum time a single socket write may take, in milliseconds.
    pub write_timeout_ms: u64,

    /// Close connections that send nothing for this long. `0` disables.
    pub idle_timeout_ms: u64,

    /// Interval between server pings. `0` disables.
    pub ping_interval_ms: u64,

    /// Drop a channel entry as soon as its last member leaves.
    pub prune_empty_channels: bool,

    /// How long shutdown waits for connection workers to finish.
    pub shutdown_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            write_timeout_ms: 5_000,
            idle_timeout_ms: 90_000,
            ping_interval_ms: 30_000,
            prune_empty_channels: false,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl HubConfig {
    /// Sets the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Sets the idle timeout and ping interval.
    #[must_use]
    pub fn with_liveness(mut self, idle_timeout_ms: u64, ping_interval_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self.ping_interval_ms = ping_interval_ms;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, ms: u64) -> Self {
        self.write_timeout_ms = ms;
        self
    }

    /// Enables or disables pruning of empty channels.
    #[must_use]
    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune_empty_channels = prune;
        self
    }

    /// Write timeout as a [`Duration`].
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Idle timeout, if enabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Ping interval, if enabled.
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    /// Shutdown drain timeout as a [`Duration`].
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidOutboundBuffer);
        }

        if self.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidWriteTimeout);
        }

        // A ping that never fits inside the idle window cannot keep a peer alive.
        if self.idle_timeout_ms > 0 && self.ping_interval_ms >= self.idle_timeout_ms {
            return Err(ConfigError::PingExceedsIdleTimeout);
        }

        Ok(())
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Hub settings.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for the given address with default hub settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            hub: HubConfig::default(),
        }
    }

    /// Replaces the hub settings.
    #[must_use]
    pub fn with_hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Loads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or if the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let hub_defaults = HubConfig::default();

        let config = Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "API_PORT", defaults.port)?,
            hub: HubConfig {
                outbound_buffer: parse_var(
                    &lookup,
                    "WS_OUTBOUND_BUFFER",
                    hub_defaults.outbound_buffer,
                )?,
                write_timeout_ms: parse_var(
                    &lookup,
                    "WS_WRITE_TIMEOUT_MS",
                    hub_defaults.write_timeout_ms,
                )?,
                idle_timeout_ms: parse_var(
                    &lookup,
                    "WS_IDLE_TIMEOUT_MS",
                    hub_defaults.idle_timeout_ms,
                )?,
                ping_interval_ms: parse_var(
                    &lookup,
                    "WS_PING_INTERVAL_MS",
                    hub_defaults.ping_interval_ms,
                )?,
                prune_empty_channels: parse_var(
                    &lookup,
                    "WS_PRUNE_EMPTY_CHANNELS",
                    hub_defaults.prune_empty_channels,
                )?,
                shutdown_timeout_ms: parse_var(
                    &lookup,
                    "SHUTDOWN_TIMEOUT_MS",
                    hub_defaults.shutdown_timeout_ms,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost);
        }
        self.hub.validate()
    }

    /// Returns the `host:port` bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Empty bind host.
    #[error("host must not be empty")]
    InvalidHost,

    /// Zero-capacity outbound queue.
    #[error("outbound_buffer must be > 0")]
    InvalidOutboundBuffer,

    /// Zero write timeout.
    #[error("write_timeout_ms must be > 0")]
    InvalidWriteTimeout,

    /// Ping interval not shorter than the idle timeout.
    #[error("ping_interval_ms must be < idle_timeout_ms")]
    PingExceedsIdleTimeout,

    /// An environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}
