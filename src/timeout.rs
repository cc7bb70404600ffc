use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the timeouts enforced by the connection pool
///
/// `connect_timeout` bounds both establishing a socket and waiting for a
/// pooled connection slot. `response_timeout` bounds the wait for the
/// status line and headers, and separately the drain of the body.
/// `pool_idle_timeout` is how long an idle keep-alive socket is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment and pool acquisition timeout
    pub connect_timeout: Duration,
    /// Response wait timeout
    pub response_timeout: Duration,
    /// Idle keep-alive duration
    pub pool_idle_timeout: Duration,
}

impl TimeoutConfig {
    /// Create a configuration using the same duration for every bound
    pub fn new(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
            response_timeout: timeout,
            pool_idle_timeout: Self::default().pool_idle_timeout,
        }
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the response timeout
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the pool idle timeout
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            response_timeout: Duration::from_secs(60),
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Predefined timeout configurations
impl TimeoutConfig {
    /// Create a timeout configuration suitable for quick requests
    pub fn quick() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(30),
        }
    }

    /// Create a timeout configuration suitable for long-running requests
    pub fn long() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(300), // 5 minutes
            pool_idle_timeout: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_config_creation() {
        let config = TimeoutConfig::new(Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.response_timeout, Duration::from_secs(30));
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.response_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_config_presets() {
        assert_eq!(TimeoutConfig::quick().response_timeout, Duration::from_secs(5));
        assert_eq!(TimeoutConfig::long().connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_config_partial_deserialize() {
        let config: TimeoutConfig =
            serde_json::from_str(r#"{"connect_timeout":{"secs":3,"nanos":0}}"#).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.response_timeout, Duration::from_secs(60));
    }
}
