//! Relay Configuration Settings
//!
//! Configuration types for the trade relay, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::connection::DEFAULT_MAX_RETRIES;
use crate::domain::symbols::DEFAULT_MAX_SYMBOLS_PER_CONNECTION;
use crate::infrastructure::binance::DEFAULT_STREAM_URL;
use crate::infrastructure::binance::reconnect::DEFAULT_RECONNECT_DELAY;

/// Upper bound on streams per connection accepted by the exchange.
pub const MAX_STREAMS_PER_CONNECTION: usize = 1024;

/// Feed endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Combined-stream WebSocket URL.
    pub url: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
        }
    }
}

/// Input and output file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSettings {
    /// Newline-separated symbol list.
    pub symbols_file: PathBuf,
    /// CSV written when the sheet is closed.
    pub output_file: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            symbols_file: PathBuf::from("symbols.txt"),
            output_file: PathBuf::from("trades.csv"),
        }
    }
}

/// Stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Symbols per WebSocket connection.
    pub max_symbols_per_connection: usize,
    /// Consecutive abnormal closures tolerated per connection.
    pub max_retries: u32,
    /// Wait before each reconnect.
    pub reconnect_delay: Duration,
    /// Reconnect jitter as a fraction of the delay.
    pub reconnect_jitter: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_symbols_per_connection: DEFAULT_MAX_SYMBOLS_PER_CONNECTION,
            max_retries: DEFAULT_MAX_RETRIES,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_jitter: 0.0,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayConfig {
    /// Feed endpoint.
    pub feed: FeedSettings,
    /// File locations.
    pub files: FileSettings,
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let feed = FeedSettings {
            url: env
                .string("BINANCE_STREAM_URL")?
                .unwrap_or_else(|| FeedSettings::default().url),
        };

        let defaults = FileSettings::default();
        let files = FileSettings {
            symbols_file: env
                .string("TRADE_RELAY_SYMBOLS_FILE")?
                .map_or(defaults.symbols_file, PathBuf::from),
            output_file: env
                .string("TRADE_RELAY_OUTPUT_FILE")?
                .map_or(defaults.output_file, PathBuf::from),
        };

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            max_symbols_per_connection: env.parse(
                "TRADE_RELAY_MAX_SYMBOLS_PER_CONNECTION",
                defaults.max_symbols_per_connection,
            ),
            max_retries: env.parse("TRADE_RELAY_MAX_RETRIES", defaults.max_retries),
            reconnect_delay: env
                .duration_millis("TRADE_RELAY_RECONNECT_DELAY_MS", defaults.reconnect_delay),
            reconnect_jitter: env.parse("TRADE_RELAY_RECONNECT_JITTER", defaults.reconnect_jitter),
        };

        let server = ServerSettings {
            health_port: env.parse(
                "TRADE_RELAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let config = Self {
            feed,
            files,
            stream,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::OutOfRange` for the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let per_connection = self.stream.max_symbols_per_connection;
        if !(1..=MAX_STREAMS_PER_CONNECTION).contains(&per_connection) {
            return Err(ConfigError::OutOfRange {
                key: "TRADE_RELAY_MAX_SYMBOLS_PER_CONNECTION",
                value: per_connection.to_string(),
                expected: "1..=1024",
            });
        }

        if self.stream.max_retries == 0 {
            return Err(ConfigError::OutOfRange {
                key: "TRADE_RELAY_MAX_RETRIES",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }

        let jitter = self.stream.reconnect_jitter;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::OutOfRange {
                key: "TRADE_RELAY_RECONNECT_JITTER",
                value: jitter.to_string(),
                expected: "0.0..=1.0",
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set but empty.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Value outside the accepted range.
    #[error("{key}={value} is out of range (expected {expected})")]
    OutOfRange {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Accepted range.
        expected: &'static str,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match (self.0)(key) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(Some(value.trim().to_string())),
            None => Ok(None),
        }
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
