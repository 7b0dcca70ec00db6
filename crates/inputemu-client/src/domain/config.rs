//! Client configuration with validation.

use inputemu_protocol::QUEUE_NAME_LEN;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Digits of the largest random queue suffix (`u32::MAX`).
const MAX_SUFFIX_DIGITS: usize = 10;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Well-known name of the driver's request queue
    pub server_queue_name: String,
    /// Base name of the per-session reply queue; a random suffix is appended
    pub client_queue_name: String,
    /// Maximum records held by the reply queue (default: 100). Kernel queues
    /// cap this at `/proc/sys/fs/mqueue/msg_max`.
    pub queue_capacity: usize,
    /// Bounded wait of each dispatcher receive (default: 50ms)
    #[serde(with = "duration_str")]
    pub receive_timeout: Duration,
    /// Dispatcher pause after an empty receive (default: 1ms)
    #[serde(with = "duration_str")]
    pub idle_sleep: Duration,
    /// Per-call reply timeout; `None` waits forever
    #[serde(with = "duration_str::option")]
    pub call_timeout: Option<Duration>,
    /// Reply timeout of the connect handshake
    #[serde(with = "duration_str")]
    pub handshake_timeout: Duration,
    /// How long disconnect waits for the server's acknowledgement
    #[serde(with = "duration_str")]
    pub disconnect_timeout: Duration,
    /// Request identifier strategy
    pub request_ids: RequestIdStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_queue_name: "driver_vrinputemulator.server_queue".to_string(),
            client_queue_name: "driver_vrinputemulator.client_queue.".to_string(),
            queue_capacity: 100,
            receive_timeout: Duration::from_millis(50),
            idle_sleep: Duration::from_millis(1),
            call_timeout: None,
            handshake_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(1),
            request_ids: RequestIdStrategy::Random,
        }
    }
}

/// How request identifiers are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestIdStrategy {
    /// Uniformly random non-zero values.
    #[default]
    Random,
    /// Session-scoped counter starting at 1.
    Sequential,
}

impl ClientConfig {
    /// Create configuration for the given queue names, other values default.
    pub fn new(server_queue_name: impl Into<String>, client_queue_name: impl Into<String>) -> Self {
        Self {
            server_queue_name: server_queue_name.into(),
            client_queue_name: client_queue_name.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `INPUTEMU_SERVER_QUEUE`: server queue name
    /// - `INPUTEMU_CLIENT_QUEUE`: client queue base name
    /// - `INPUTEMU_CALL_TIMEOUT`: per-call timeout (`"500ms"`, `"5s"`, `"none"`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(name) = env::var("INPUTEMU_SERVER_QUEUE") {
            config.server_queue_name = name;
        }
        if let Ok(name) = env::var("INPUTEMU_CLIENT_QUEUE") {
            config.client_queue_name = name;
        }
        if let Ok(timeout) = env::var("INPUTEMU_CALL_TIMEOUT") {
            config.call_timeout = duration_str::parse_optional(&timeout)
                .map_err(|e| ConfigError::InvalidTimeout(format!("INPUTEMU_CALL_TIMEOUT: {e}")))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_queue_name.is_empty() {
            return Err(ConfigError::InvalidQueueName(
                "server queue name cannot be empty".into(),
            ));
        }
        if self.client_queue_name.is_empty() {
            return Err(ConfigError::InvalidQueueName(
                "client queue name cannot be empty".into(),
            ));
        }

        // base name plus suffix must fit the handshake field with its terminator
        if self.client_queue_name.len() + MAX_SUFFIX_DIGITS >= QUEUE_NAME_LEN {
            return Err(ConfigError::InvalidQueueName(format!(
                "client queue name '{}' leaves no room for the session suffix",
                self.client_queue_name
            )));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "queue_capacity cannot be 0".into(),
            ));
        }

        if self.receive_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "receive_timeout cannot be 0".into(),
            ));
        }

        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "call_timeout cannot be 0, use none to wait forever".into(),
            ));
        }

        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "handshake_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Queue name empty or too long
    #[error("invalid queue name: {0}")]
    InvalidQueueName(String),
    /// Queue capacity out of range
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Configuration text could not be parsed
    #[error("parse error: {0}")]
    Parse(String),
}

/// Duration (de)serialization as `"50ms"`, `"5s"` or `"2m"` strings
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub fn format(duration: &Duration) -> String {
        if duration.subsec_nanos() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub fn parse(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // plain number means milliseconds
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid duration format")
        }
    }

    pub fn parse_optional(s: &str) -> Result<Option<Duration>, &'static str> {
        match s.trim() {
            "" | "none" | "forever" => Ok(None),
            other => parse(other).map(Some),
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_str(&super::format(d)),
                None => serializer.serialize_str("none"),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            super::parse_optional(&s).map_err(serde::de::Error::custom)
        }
    }
}
