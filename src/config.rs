// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Configuration for connecting to a base unit.

use tokio::time::Duration;

/// Configuration for a [`BaseUnit`](crate::baseunit::BaseUnit) or a
/// [`ClientSession`](crate::session::ClientSession).
#[derive(Debug, Clone)]
pub struct BaseUnitConfig {
    /// Host name or IP address for the LifeSOS ethernet interface.
    pub host: String,
    /// Port number for the LifeSOS ethernet interface.
    pub port: u16,
    /// Control password, if one has been assigned on the base unit.
    pub password: String,
    /// Interval to wait between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Default timeout to wait for a response when executing commands.
    pub execute_timeout: Duration,
    /// Send a keep-alive probe when nothing has been sent or received for
    /// this long.
    pub keepalive_interval: Duration,
    /// Number of attempts for each query during startup discovery.
    pub discovery_retries: u32,
}

impl Default for BaseUnitConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 1680,
            password: String::new(),
            reconnect_interval: Duration::from_secs(30),
            execute_timeout: Duration::from_secs(8),
            keepalive_interval: Duration::from_secs(30),
            discovery_retries: 3,
        }
    }
}

impl BaseUnitConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> BaseUnitConfigBuilder {
        BaseUnitConfigBuilder::default()
    }
}

/// Builder for [`BaseUnitConfig`].
#[derive(Debug, Clone, Default)]
pub struct BaseUnitConfigBuilder {
    config: BaseUnitConfig,
}

impl BaseUnitConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.config.execute_timeout = timeout;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    pub fn discovery_retries(mut self, retries: u32) -> Self {
        self.config.discovery_retries = retries;
        self
    }

    pub fn build(self) -> BaseUnitConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BaseUnitConfig::builder()
            .host("10.0.0.5")
            .port(1234)
            .password("9876")
            .discovery_retries(5)
            .build();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 1234);
        assert_eq!(config.password, "9876");
        assert_eq!(config.discovery_retries, 5);
    }

    #[test]
    fn test_config_defaults() {
        let config = BaseUnitConfig::default();
        assert_eq!(config.reconnect_interval, Duration::from_secs(30));
        assert_eq!(config.execute_timeout, Duration::from_secs(8));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.discovery_retries, 3);
    }
}
