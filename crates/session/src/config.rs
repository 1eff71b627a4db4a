//! Configuration for a pad session.
//!
//! `SessionConfig` supports serde deserialization, so it can be embedded in
//! the application's TOML file as a `[session]` table. Every field has a
//! default; an empty table yields a working local setup.
//!
//! # Validation
//!
//! The `validator` crate enforces the constraints below when the manager is
//! built, so a bad file fails at startup rather than on the first reconnect.
//!
//! # Examples
//!
//! ```ignore
//! let config: SessionConfig = toml::from_str(r#"
//!     url = "ws://pad.local:3000/ws"
//!     reconnect_base_delay_ms = 500
//!     max_reconnect_attempts = 20
//! "#)?;
//!
//! // Or construct programmatically
//! let config = SessionConfig {
//!     url: "ws://10.0.0.5:3000/ws".into(),
//!     auto_start_stream: false,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{backoff::ReconnectScheduler, message::EventType};

/// Settings for the session, its reconnect policy and its resync behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_delays", skip_on_field_errors = true))]
pub struct SessionConfig {
    /// WebSocket endpoint of the profile server.
    ///
    /// # Examples
    /// ```toml
    /// url = "ws://127.0.0.1:3000/ws"
    /// url = "wss://pad.example.com/ws"
    /// ```
    #[validate(custom(function = "validate_ws_url"))]
    pub url: String,

    /// Delay before the first automatic retry, in milliseconds.
    ///
    /// Each further retry doubles it until `reconnect_max_delay_ms`.
    #[validate(range(
        min = 1,
        max = 60_000,
        message = "Reconnect base delay must be between 1 and 60000 ms"
    ))]
    pub reconnect_base_delay_ms: u64,

    /// Cap on any single retry delay, in milliseconds.
    #[validate(range(
        min = 1,
        max = 3_600_000,
        message = "Reconnect max delay must be between 1 and 3600000 ms"
    ))]
    pub reconnect_max_delay_ms: u64,

    /// Automatic retries before the session gives up and enters `Failed`.
    ///
    /// # Typical Values
    /// - 3: fail fast, operator reconnects by hand
    /// - 10: default, about four minutes with the default delays
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Max reconnect attempts must be between 1 and 1000"
    ))]
    pub max_reconnect_attempts: u32,

    /// Gap between commands replayed from the queue on open, in milliseconds.
    ///
    /// Gives the server time to apply each profile change before the next.
    #[validate(range(max = 5_000, message = "Send stagger must not exceed 5000 ms"))]
    pub send_stagger_ms: u64,

    /// Ask for the sensor stream on every open.
    ///
    /// Skipped when the replayed queue already starts or stops the stream.
    pub auto_start_stream: bool,

    /// Connect as soon as the session is started.
    pub connect_on_start: bool,

    /// Event types subscribed to before the first open.
    pub subscriptions: Vec<EventType>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            url: "ws://127.0.0.1:3000/ws".to_string(),
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            send_stagger_ms: 50,
            auto_start_stream: true,
            connect_on_start: true,
            subscriptions: EventType::ALL.to_vec(),
        }
    }
}

impl SessionConfig {
    /// Convenience constructor with defaults for everything but the endpoint.
    pub fn with_url(url: impl Into<String>) -> Self {
        SessionConfig {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn send_stagger(&self) -> Duration {
        Duration::from_millis(self.send_stagger_ms)
    }

    /// Builds the reconnect scheduler described by this config.
    pub fn scheduler(&self) -> ReconnectScheduler {
        ReconnectScheduler::new(
            self.reconnect_base_delay(),
            self.reconnect_max_delay(),
            self.max_reconnect_attempts,
        )
    }
}

fn validate_ws_url(url: &str) -> Result<(), ValidationError> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| {
            ValidationError::new("invalid_scheme")
                .with_message("URL must start with ws:// or wss://".into())
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ValidationError::new("missing_host").with_message("URL has no host".into()));
    }

    Ok(())
}

fn validate_delays(config: &SessionConfig) -> Result<(), ValidationError> {
    if config.reconnect_max_delay_ms < config.reconnect_base_delay_ms {
        return Err(ValidationError::new("max_below_base").with_message(
            "reconnect_max_delay_ms must not be smaller than reconnect_base_delay_ms".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.subscriptions.len(), 3);
        assert_eq!(config.send_stagger(), Duration::from_millis(50));
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: SessionConfig = toml::from_str(
            r#"
            url = "wss://pad.example.com/ws"
            max_reconnect_attempts = 3
            subscriptions = ["command_response"]
            "#,
        )
        .unwrap();
        assert_eq!(config.url, "wss://pad.example.com/ws");
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.subscriptions, vec![EventType::CommandResponse]);
        assert!(config.auto_start_stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let config = SessionConfig::with_url("http://127.0.0.1:3000/ws");
        assert!(config.validate().is_err());

        let config = SessionConfig::with_url("ws:///ws");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_max_delay_below_base() {
        let config = SessionConfig {
            reconnect_base_delay_ms: 5_000,
            reconnect_max_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = SessionConfig {
            max_reconnect_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_uses_configured_policy() {
        let config = SessionConfig {
            reconnect_base_delay_ms: 200,
            reconnect_max_delay_ms: 800,
            max_reconnect_attempts: 4,
            ..Default::default()
        };
        let scheduler = config.scheduler();
        assert_eq!(scheduler.base_delay(), Duration::from_millis(200));
        assert_eq!(scheduler.max_delay(), Duration::from_millis(800));
        assert_eq!(scheduler.max_attempts(), 4);
    }
}
