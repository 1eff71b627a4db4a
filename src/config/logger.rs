//! Logging configuration structures and validation logic.
//!
//! These types make up the `[logger]` table of the configuration file. All
//! of them support serialization via `serde` and are checked with the
//! `validator` crate before the subscriber is built.
//!
//! ```toml
//! [logger]
//! level = "info"
//! directives = ["padlink_session=debug"]
//! timestamp_format = "Unix"
//!
//! [logger.console]
//! format = "pretty"
//! show_target = true
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Available formats for console log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Formats available for timestamp representation in log entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampFormat {
    #[default]
    Rfc3339,
    /// Seconds since the Unix epoch.
    Unix,
    /// A `time` format description, e.g. `"[hour]:[minute]:[second]"`.
    Custom(String),
}

/// Top-level logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level. Valid values: trace, debug, info, warn, error (case-insensitive).
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// Extra `EnvFilter` directives layered over `level`, such as
    /// `"padlink_session=trace"`. Ignored when `RUST_LOG` is set.
    pub directives: Vec<String>,

    /// Optional console output configuration.
    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    /// Optional systemd journald output configuration.
    #[validate(nested)]
    pub journald: Option<JournaldConfig>,

    /// Timestamp format used by the console output.
    #[validate(custom(function = "validate_timestamp_format"))]
    pub timestamp_format: TimestampFormat,
}

fn validate_timestamp_format(format: &TimestampFormat) -> Result<(), ValidationError> {
    match format {
        TimestampFormat::Custom(s) if s.is_empty() => {
            let mut err = ValidationError::new("invalid_timestamp_format");
            err.message = Some("Custom timestamp format cannot be empty".into());
            Err(err)
        }
        TimestampFormat::Custom(s) => match time::format_description::parse(s) {
            Ok(_) => Ok(()),
            Err(e) => {
                let mut err = ValidationError::new("invalid_timestamp_format");
                err.message = Some(format!("Invalid timestamp format '{}': {}", s, e).into());
                Err(err)
            }
        },
        _ => Ok(()),
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            directives: Vec::new(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
            timestamp_format: TimestampFormat::default(),
        }
    }
}

/// Configuration for console log output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,

    pub format: LogFormat,

    /// Include the log target (module path) in output.
    pub show_target: bool,

    pub show_thread_ids: bool,

    /// Include span close events in output.
    pub show_spans: bool,

    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// Configuration for systemd journald output (Unix only).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Identifier used for journal entries. Must be non-empty.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "padlink".to_string(),
        }
    }
}
