//! Error handling for session operations.
//!
//! This module defines `SessionError`, the single error type returned by the
//! session, its codec, the transport and the driver handle. Variants fall into
//! the categories the session distinguishes at runtime:
//!
//! **Rejections** (caller asked for something the state machine refuses):
//! - `Rejected`: a connect request raced an attempt already in flight, or the
//!   session is in `Failed` and needs a manual reconnect
//!
//! **Wire errors** (one frame is bad, the session carries on):
//! - `Encode`: an outbound command could not be turned into a frame
//! - `Decode`: an inbound frame was not a valid server message
//!
//! **Channel errors** (recoverable through reconnection):
//! - `Transport`: the channel failed to open or broke while in use
//! - `ChannelClosed`: the driver task is gone, requests can no longer be queued
//! - `RetriesPolicy`: the reconnect budget is spent
//!
//! **Startup errors**:
//! - `ConfigError`: validation failures in settings
//! - `Io`: file or socket errors outside the channel itself
//!
//! # Usage
//!
//! ```ignore
//! match session.connect() {
//!     Ok(actions) => driver.execute(actions),
//!     Err(SessionError::Rejected(reason)) => warn!("connect ignored: {reason}"),
//!     Err(e) => error!("unexpected: {e}"),
//! }
//! ```

use thiserror::Error;

/// The unified error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The state machine refused the request.
    ///
    /// Raised for reentrancy violations: `connect()` while a reconnect is
    /// scheduled or a channel is already opening, or `connect()` from
    /// `Failed`. The session state is left untouched.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// An outbound command could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An inbound frame could not be decoded into a `ServerMessage`.
    ///
    /// Possible causes:
    /// - The frame is not JSON
    /// - Required fields (`success`, `message`) are missing
    /// - `sensor_values` is not exactly four integers in 0..=1023
    ///
    /// Recovery: the frame is dropped and reported; the connection stays up.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The channel could not be opened, or failed while open.
    ///
    /// Recovery: automatic, the session schedules a reconnect unless the
    /// retry budget is exhausted.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The driver task has stopped and no longer accepts requests.
    #[error("Session driver is not running")]
    ChannelClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("Retry policy error: {0}")]
    RetriesPolicy(#[from] super::backoff::BackoffError),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}
