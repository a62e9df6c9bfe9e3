//! Service Configuration Settings
//!
//! Configuration types for the currency service, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::broadcast::DEFAULT_TICK_CAPACITY;
use crate::infrastructure::ecb::DEFAULT_RATES_URL;

/// How streaming sessions decide when to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Push on every simulator tick, computed from the tick's snapshot.
    #[default]
    Tick,
    /// Each session pushes on its own interval from the live table.
    Poll,
}

impl DeliveryMode {
    /// Parse a mode name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tick" => Some(Self::Tick),
            "poll" => Some(Self::Poll),
            _ => None,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Poll => "poll",
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 9092,
            health_port: 8083,
        }
    }
}

/// Reference feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Feed document URL.
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_RATES_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Streaming delivery settings.
#[derive(Debug, Clone)]
pub struct StreamingSettings {
    /// Simulator tick interval.
    pub update_interval: Duration,
    /// Push trigger for every session on this server.
    pub delivery_mode: DeliveryMode,
    /// Per-session push interval in [`DeliveryMode::Poll`].
    pub poll_interval: Duration,
    /// Ticks buffered per session before it lags.
    pub tick_capacity: usize,
    /// Outbound messages buffered per session.
    pub session_buffer: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            delivery_mode: DeliveryMode::Tick,
            poll_interval: Duration::from_secs(5),
            tick_capacity: DEFAULT_TICK_CAPACITY,
            session_buffer: 256,
        }
    }
}

/// Default time allowed for tasks to stop after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Reference feed settings.
    pub feed: FeedSettings,
    /// Streaming delivery settings.
    pub streaming: StreamingSettings,
    /// Longest wait for tasks to finish after shutdown is requested.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            feed: FeedSettings::default(),
            streaming: StreamingSettings::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let server_defaults = ServerSettings::default();
        let feed_defaults = FeedSettings::default();
        let streaming_defaults = StreamingSettings::default();

        let url = env
            .string("CURRENCY_RATES_URL")
            .unwrap_or(feed_defaults.url);
        reqwest::Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
            key: "CURRENCY_RATES_URL".to_string(),
            message: e.to_string(),
        })?;

        let feed = FeedSettings {
            url,
            timeout: env.duration_secs("CURRENCY_FETCH_TIMEOUT_SECS", feed_defaults.timeout)?,
        };

        let server = ServerSettings {
            grpc_port: env.parse("CURRENCY_GRPC_PORT", server_defaults.grpc_port)?,
            health_port: env.parse("CURRENCY_HEALTH_PORT", server_defaults.health_port)?,
        };

        let delivery_mode = match env.string("CURRENCY_DELIVERY_MODE") {
            Some(value) => DeliveryMode::from_str_case_insensitive(&value)
                .ok_or(ConfigError::UnknownDeliveryMode(value))?,
            None => streaming_defaults.delivery_mode,
        };

        let streaming = StreamingSettings {
            update_interval: env.duration_millis(
                "CURRENCY_UPDATE_INTERVAL_MS",
                streaming_defaults.update_interval,
            )?,
            delivery_mode,
            poll_interval: env
                .duration_millis("CURRENCY_POLL_INTERVAL_MS", streaming_defaults.poll_interval)?,
            tick_capacity: env.positive("CURRENCY_TICK_CAPACITY", streaming_defaults.tick_capacity)?,
            session_buffer: env
                .positive("CURRENCY_SESSION_BUFFER", streaming_defaults.session_buffer)?,
        };

        Ok(Self {
            server,
            feed,
            streaming,
            shutdown_grace: env
                .duration_secs("CURRENCY_SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE)?,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        message: String,
    },
    /// Interval or capacity set to zero.
    #[error("{0} must be greater than zero")]
    Zero(String),
    /// Delivery mode is neither `tick` nor `poll`.
    #[error("unknown delivery mode {0:?}, expected \"tick\" or \"poll\"")]
    UnknownDeliveryMode(String),
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key).map_or(Ok(default), |v| {
            v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(ConfigError::Zero(key.to_string())),
            value => Ok(value),
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.parse(key, default.as_secs())? {
            0 => Err(ConfigError::Zero(key.to_string())),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        match self.parse(key, default_ms)? {
            0 => Err(ConfigError::Zero(key.to_string())),
            millis => Ok(Duration::from_millis(millis)),
        }
    }
}
