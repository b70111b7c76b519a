use std::time::Duration;

use serde::Deserialize;

/// Address of the broker a session connects to.
///
/// Plain value: cloning it or dropping it has no side effects. Library
/// initialisation is tied to `Session`, not to this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub address: String,
    pub port: u16,
    pub keep_alive: Duration,
}

impl HostConfig {
    pub const DEFAULT_ADDRESS: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 1883;
    pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// Loopback broker on the standard MQTT port with a 60 second keep-alive.
impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: Self::DEFAULT_ADDRESS.to_string(),
            port: Self::DEFAULT_PORT,
            keep_alive: Self::DEFAULT_KEEP_ALIVE,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level configuration settings for the application.
///
/// Includes the broker host and the logging setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub host: HostConfig,
    pub logging: LoggingSettings,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub host: Option<PartialHostSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

/// Partial host settings.
#[derive(Debug, Deserialize)]
pub struct PartialHostSettings {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub keep_alive_secs: Option<u64>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}
