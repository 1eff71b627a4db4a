//! Application configuration loading, validation, and management.
//!
//! The top-level `Config` aggregates the `[logger]` and `[session]` tables.
//! It is loaded once at startup from TOML, validated, and treated as
//! immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use padlink_session::SessionConfig;
use serde::{Deserialize, Serialize};
use validator::Validate;

use self::logger::LoggerConfig;

pub mod logger;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PADLINK_CONFIG";

/// Environment variable overriding `session.url`.
pub const URL_ENV: &str = "PADLINK_URL";

const LOCAL_CONFIG: &str = "padlink.toml";

/// Timestamp used by the `print_*` macros.
#[doc(hidden)]
pub fn console_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Timestamped console output for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            ::console::style($crate::config::console_timestamp()).dim(),
            ::console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            ::console::style($crate::config::console_timestamp()).dim(),
            ::console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            ::console::style($crate::config::console_timestamp()).dim(),
            ::console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors that can occur during configuration loading, parsing or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Session, reconnect and resync settings.
    #[validate(nested)]
    pub session: SessionConfig,
}

impl Config {
    /// Locates, loads and validates the configuration.
    ///
    /// Without any config file the defaults are used, which point at a
    /// server on localhost.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a file was found but cannot be read,
    /// parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let mut config = match Self::get_config_path()? {
            Some(path) => Self::load(&path)?,
            None => {
                print_warn!("No configuration file found, using defaults");
                Config::default()
            }
        };

        if let Ok(url) = std::env::var(URL_ENV) {
            print_info!("Using server URL from {}: {}", URL_ENV, url);
            config.session.url = url;
            config
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        Ok(config)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `PADLINK_CONFIG` environment variable (must exist)
    /// 2. `./padlink.toml`
    fn get_config_path() -> Result<Option<PathBuf>, ConfigError> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            if !path.exists() {
                return Err(ConfigError::Config(format!(
                    "{} points to a missing file: {}",
                    CONFIG_ENV,
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            print_info!("Using config from working directory: {}", local.display());
            return Ok(Some(local.to_path_buf()));
        }

        Ok(None)
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());
        let config_str = fs::read_to_string(path)?;
        let config = Self::from_toml(&config_str)?;
        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }
}
