//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Knobs of one protocol session.
///
/// This is the in-memory form consumed by the session engine; the file
/// format counterpart is [`SessionSettings`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-request timeout for outbound calls. `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Upper bound on concurrently running inbound request handlers.
    pub max_concurrent_requests: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            max_concurrent_requests: 8,
        }
    }
}

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Session engine settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        if self.session.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError {
                message: "session.max_concurrent_requests must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Name advertised in the initialise response.
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

fn default_server_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

/// Session engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    /// Per-request timeout in milliseconds. `null` disables the timeout.
    /// Default: 30000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: Option<u64>,

    /// Upper bound on concurrently running request handlers.
    /// Default: 8
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl SessionSettings {
    /// Converts the file form into the engine's [`SessionConfig`].
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
            max_concurrent_requests: self.max_concurrent_requests,
        }
    }
}

const fn default_request_timeout_ms() -> Option<u64> {
    Some(30_000)
}

const fn default_max_concurrent_requests() -> usize {
    8
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", or "error".
    /// Default: "warn"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
