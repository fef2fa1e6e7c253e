//! Network configuration types for the bookinfo server.

use std::time::Duration;

use serde::Deserialize;

use crate::service::operation::ConfigError;

/// Listener and HTTP-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Upper bound on handling one HTTP request, also used as the call deadline.
    pub request_timeout_ms: u64,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_ms: 30_000,
            drain_timeout_ms: 30_000,
        }
    }
}

impl NetworkConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` for an empty host or a zero
    /// request timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidThreshold {
                field: "network.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidThreshold {
                field: "network.request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn zero_request_timeout_rejected() {
        let config = NetworkConfig {
            request_timeout_ms: 0,
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { field: "network.request_timeout_ms", .. })
        ));
    }

    #[test]
    fn empty_host_rejected() {
        let config = NetworkConfig {
            host: " ".to_string(),
            ..NetworkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
