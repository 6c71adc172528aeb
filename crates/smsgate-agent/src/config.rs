//! Agent configuration.
//!
//! Loaded from a TOML file: the server endpoint, the reconnect backoff
//! envelope, the keepalive interval and the external send command.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::validate_endpoint;
use crate::error::AgentError;
use crate::session::BackoffConfig;

/// Reconnect backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffSettings {
    /// Delay before the first reconnection attempt, in seconds.
    pub initial_delay_secs: u64,
    /// Ceiling for the delay between attempts, in seconds.
    pub max_delay_secs: u64,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            max_delay_secs: 60,
            multiplier: 1.5,
        }
    }
}

impl From<&BackoffSettings> for BackoffConfig {
    fn from(settings: &BackoffSettings) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            multiplier: settings.multiplier,
        }
    }
}

/// Main agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Task server WebSocket URL (`ws://` or `wss://`).
    pub endpoint: String,
    /// Keepalive ping interval in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Reconnect backoff settings.
    #[serde(default)]
    pub backoff: BackoffSettings,
    /// External command invoked to transmit a message; destination and
    /// body are appended as the final two arguments.
    pub send_command: Vec<String>,
}

const fn default_ping_interval_secs() -> u64 {
    20
}

impl AgentConfig {
    /// Create a config for `endpoint` with default settings and a
    /// placeholder send command.
    #[must_use]
    pub fn sample(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ping_interval_secs: default_ping_interval_secs(),
            backoff: BackoffSettings::default(),
            send_command: vec!["sms-send".to_string()],
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, AgentError> {
        let config: Self =
            toml::from_str(content).map_err(|e| AgentError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), AgentError> {
        validate_endpoint(&self.endpoint)?;

        if self.ping_interval_secs == 0 {
            return Err(AgentError::Config(
                "ping_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.backoff.initial_delay_secs == 0 {
            return Err(AgentError::Config(
                "backoff.initial_delay_secs must be at least 1".to_string(),
            ));
        }
        if self.backoff.max_delay_secs < self.backoff.initial_delay_secs {
            return Err(AgentError::Config(
                "backoff.max_delay_secs cannot be below backoff.initial_delay_secs".to_string(),
            ));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(AgentError::Config(
                "backoff.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.send_command.is_empty() {
            return Err(AgentError::Config(
                "send_command cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AgentError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AgentError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            AgentError::Config(format!(
                "failed to write config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Keepalive ping interval as a [`Duration`].
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Backoff settings as a [`BackoffConfig`].
    #[must_use]
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::from(&self.backoff)
    }
}
