//! Centralized logging configuration and initialization manager.
//!
//! The `LoggerManager` validates logging configuration and initializes
//! the global `tracing` subscriber with a console layer and, when built with
//! the `journald` feature, a systemd journald layer.

use std::{fmt as std_fmt, io};

use thiserror::Error;
use time::format_description::OwnedFormatItem;
use tracing::instrument;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{
        self,
        format::{FmtSpan, Writer},
        time::{FormatTime, UtcTime},
    },
    prelude::*,
};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig, TimestampFormat},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// A configured filter directive could not be parsed.
    #[error("Filter directive error: {0}")]
    DirectiveError(#[from] tracing_subscriber::filter::ParseError),

    /// IO error, typically during journald socket operations.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald was the only output and it could not be initialized.
    #[error("Failed to initialize journald logger and console output is disabled")]
    JournaldFailedWithoutConsole,
}

/// Seconds since the epoch, for `TimestampFormat::Unix`.
struct UnixTime;

impl FormatTime for UnixTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std_fmt::Result {
        write!(w, "{}", time::OffsetDateTime::now_utc().unix_timestamp())
    }
}

/// Manages logging configuration and global subscriber initialization.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Creates a new `LoggerManager` and validates the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    /// Initializes the global `tracing` subscriber with configured layers.
    ///
    /// Must be called once at startup, before any tracing macros are used.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid layers can be created or if journald
    /// initialization fails while it is the only enabled output.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let Some(console_config) = self.config.console.as_ref().filter(|c| c.enabled) {
            let filter = self.filter()?;
            layers.push(self.init_console_logger(console_config, filter)?);
        }

        if let Some(journald_config) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match self.init_journald_logger(&journald_config.identifier) {
                Ok(layer) => {
                    layers.push(layer);
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        journald_config.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize systemd journald logger: {}", e);
                    if layers.is_empty() {
                        return Err(LoggerError::JournaldFailedWithoutConsole);
                    }
                }
            }
        }

        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    /// `RUST_LOG` wins; otherwise the configured level plus directives.
    fn filter(&self) -> Result<EnvFilter, LoggerError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let mut filter = EnvFilter::new(&self.config.level);
        for directive in &self.config.directives {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    fn init_console_logger(
        &self,
        config: &ConsoleConfig,
        filter: EnvFilter,
    ) -> Result<BoxedLayer, LoggerError> {
        let layer = match &self.config.timestamp_format {
            TimestampFormat::Rfc3339 => console_layer(config, filter, UtcTime::rfc_3339()),
            TimestampFormat::Unix => console_layer(config, filter, UnixTime),
            TimestampFormat::Custom(description) => {
                let format: OwnedFormatItem = time::format_description::parse_owned::<2>(
                    description,
                )
                .map_err(|e| LoggerError::InitializationError(e.to_string()))?;
                console_layer(config, filter, UtcTime::new(format))
            }
        };
        Ok(layer)
    }

    #[cfg(feature = "journald")]
    fn init_journald_logger(&self, identifier: &str) -> Result<BoxedLayer, LoggerError> {
        let filter = self.filter()?;
        let layer = tracing_journald::layer()?.with_syslog_identifier(identifier.to_string());
        Ok(layer.with_filter(filter).boxed())
    }

    #[cfg(not(feature = "journald"))]
    fn init_journald_logger(&self, _identifier: &str) -> Result<BoxedLayer, LoggerError> {
        Err(LoggerError::InitializationError(
            "built without the journald feature".to_string(),
        ))
    }
}

fn console_layer<T>(config: &ConsoleConfig, filter: EnvFilter, timer: T) -> BoxedLayer
where
    T: FormatTime + Send + Sync + 'static,
{
    let spans = if config.show_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_timer(timer)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_span_events(spans)
        .with_ansi(config.ansi_colors)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    }
}
