//! Connection state of a session.
//!
//! The state is owned by the `Session` and published by the driver through a
//! watch channel, so presentation code can render a status line and react to
//! `Failed` without polling.
//!
//! # Examples
//!
//! ```ignore
//! use padlink_session::ConnectionState;
//!
//! let state = ConnectionState::Reconnecting;
//! println!("Status: {}", state);  // "Reconnecting"
//! assert!(state.is_connecting());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents the current state of the session's channel.
///
/// The lifecycle flows through these states:
/// - `Disconnected` -> `Connecting` (explicit connect)
/// - `Connecting` -> `Open` (channel opened)
/// - `Connecting`/`Open` -> `Reconnecting` (channel closed or errored, retries left)
/// - `Reconnecting` -> `Connecting` (backoff delay elapsed)
/// - `Connecting`/`Open` -> `Failed` (retry budget exhausted)
/// - any -> `Disconnected` (explicit close)
///
/// `Failed` is left only through a manual reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel and no retry scheduled.
    Disconnected,

    /// A channel open is in flight.
    ///
    /// Submitted commands are queued until the open completes.
    Connecting,

    /// The channel is open; commands are sent immediately.
    Open,

    /// The channel was lost and a retry timer is armed.
    Reconnecting,

    /// The retry budget is exhausted. Nothing happens until a manual reconnect.
    Failed,
}

impl ConnectionState {
    /// Returns a short string identifier for the state.
    ///
    /// # Returns
    /// One of: `"Disconnected"`, `"Connecting"`, `"Open"`, `"Reconnecting"`, `"Failed"`
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Failed => "Failed",
        }
    }

    /// Returns true only when commands go straight to the channel.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns true while an open or a scheduled retry is pending.
    ///
    /// These are the states in which a new `connect()` would race the
    /// attempt already in flight.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }

    /// Returns true for the state that needs operator action to leave.
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }

    /// Returns true when a live or opening channel exists for this state.
    pub(crate) fn has_channel(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
