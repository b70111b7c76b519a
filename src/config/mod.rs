//! Configuration loading
//!
//! Settings come from an optional `config/default.*` file and from
//! environment variables prefixed with `MQTTBIND_`, nested keys separated by
//! a double underscore:
//!
//! ```text
//! MQTTBIND_HOST__ADDRESS=broker.local
//! MQTTBIND_HOST__PORT=1884
//! MQTTBIND_HOST__KEEP_ALIVE_SECS=30
//! MQTTBIND_LOGGING__LEVEL=debug
//! ```
//!
//! Anything left unset falls back to `Settings::default()`.

mod settings;

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{HostConfig, LoggingSettings, Settings};

const ENV_PREFIX: &str = "MQTTBIND";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load(File::with_name("config/default").required(false))
}

/// Same as `load_config`, reading the given file instead of `config/default`.
/// The file must exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    load(File::from(path.as_ref()).required(true))
}

fn load<S>(file: S) -> Result<Settings, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;
    merge(partial)
}

/// Fills everything `partial` leaves unset from `Settings::default()`.
fn merge(partial: PartialSettings) -> Result<Settings, ConfigError> {
    let default = Settings::default();
    let host = partial.host;

    let port = host
        .as_ref()
        .and_then(|h| h.port)
        .unwrap_or(default.host.port);
    if port == 0 {
        return Err(ConfigError::Message(
            "host.port must be between 1 and 65535".to_string(),
        ));
    }

    Ok(Settings {
        host: HostConfig {
            address: host
                .as_ref()
                .and_then(|h| h.address.clone())
                .unwrap_or(default.host.address),
            port,
            keep_alive: host
                .as_ref()
                .and_then(|h| h.keep_alive_secs)
                .map(Duration::from_secs)
                .unwrap_or(default.host.keep_alive),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .and_then(|l| l.level)
                .unwrap_or(default.logging.level),
        },
    })
}
