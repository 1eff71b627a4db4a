//! Operator-facing readiness of the pad server link.
//!
//! Translates the session's `ConnectionState` into a coarser readiness
//! signal for the status line: either the pad server is reachable and
//! commands go out immediately, or it is not and they are being queued.

use std::fmt;

use padlink_session::ConnectionState;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Represents the current readiness state of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// The channel is open.
    Ready,
    /// Commands are queued; the reason says why.
    NotReadyYet(String),
    /// The retry budget is spent and only a manual reconnect helps.
    NeedsOperator(String),
    /// No state has been observed yet.
    Unknown,
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    /// Variant name without the reason.
    pub fn as_str(&self) -> &str {
        match self {
            ReadinessState::Ready => "Ready",
            ReadinessState::NotReadyYet(_) => "NotReadyYet",
            ReadinessState::NeedsOperator(_) => "NeedsOperator",
            ReadinessState::Unknown => "Unknown",
        }
    }

    /// Returns the reason for the not-ready states, otherwise an empty string.
    pub fn reason(&self) -> &str {
        match self {
            ReadinessState::NotReadyYet(reason) | ReadinessState::NeedsOperator(reason) => reason,
            _ => "",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => write!(f, "Ready"),
            ReadinessState::NotReadyYet(reason) => write!(f, "NotReadyYet: {}", reason),
            ReadinessState::NeedsOperator(reason) => write!(f, "NeedsOperator: {}", reason),
            ReadinessState::Unknown => write!(f, "Unknown"),
        }
    }
}

impl From<ConnectionState> for ReadinessState {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Open => ReadinessState::Ready,
            ConnectionState::Connecting => ReadinessState::NotReadyYet("Connecting...".into()),
            ConnectionState::Reconnecting => {
                ReadinessState::NotReadyYet("Waiting to reconnect".into())
            }
            ConnectionState::Disconnected => ReadinessState::NotReadyYet("Disconnected".into()),
            ConnectionState::Failed => ReadinessState::NeedsOperator(
                "Reconnect attempts exhausted, type 'reconnect'".into(),
            ),
        }
    }
}

/// Forwards session state changes into `state_tx` until either side closes.
pub async fn listen(
    mut connection_state_rx: watch::Receiver<ConnectionState>,
    state_tx: watch::Sender<ReadinessState>,
) {
    debug!("Listening for session state changes");

    let initial = *connection_state_rx.borrow_and_update();
    let _ = state_tx.send(ReadinessState::from(initial));

    while connection_state_rx.changed().await.is_ok() {
        let conn_state = *connection_state_rx.borrow_and_update();
        let readiness_state = ReadinessState::from(conn_state);
        debug!(
            "Transition: session {} -> readiness {}",
            conn_state, readiness_state
        );

        if state_tx.send(readiness_state).is_err() {
            warn!("No subscribers to readiness status");
            break;
        }
    }

    debug!("Session state channel closed, listening stopped");
}

/// Cloneable readiness tracker read by the console and the status line.
#[derive(Debug, Clone)]
pub struct Readiness {
    state_tx: watch::Sender<ReadinessState>,
    state_rx: watch::Receiver<ReadinessState>,
}

impl Readiness {
    /// Starts in `Unknown` until the first session state arrives.
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ReadinessState::Unknown);
        Self { state_tx, state_rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> ReadinessState {
        self.state_rx.borrow().clone()
    }

    /// Spawns a task that follows the session's connection state.
    pub fn start_listening(&self, connection_state_rx: watch::Receiver<ConnectionState>) {
        let state_tx = self.state_tx.clone();
        tokio::spawn(listen(connection_state_rx, state_tx));
    }

    /// Overrides the state, e.g. while the link is deliberately closed.
    pub fn set_state(&self, state: ReadinessState) {
        let old_state = self.state_tx.send_replace(state.clone());
        debug!(
            "Readiness overridden: {} -> {}",
            old_state, state
        );
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_state_is_ready() {
        assert!(ReadinessState::Ready.is_ready());
        assert!(!ReadinessState::Unknown.is_ready());
        assert!(!ReadinessState::NotReadyYet("Connecting...".into()).is_ready());
        assert!(!ReadinessState::NeedsOperator("failed".into()).is_ready());
    }

    #[test]
    fn test_readiness_state_reason() {
        assert_eq!(ReadinessState::Ready.reason(), "");
        assert_eq!(
            ReadinessState::NeedsOperator("exhausted".into()).reason(),
            "exhausted"
        );
    }

    #[test]
    fn test_from_connection_state() {
        assert_eq!(
            ReadinessState::from(ConnectionState::Open),
            ReadinessState::Ready
        );
        assert_eq!(
            ReadinessState::from(ConnectionState::Reconnecting).as_str(),
            "NotReadyYet"
        );
        assert_eq!(
            ReadinessState::from(ConnectionState::Failed).as_str(),
            "NeedsOperator"
        );
    }

    #[tokio::test]
    async fn test_readiness_set_state() {
        let readiness = Readiness::new();
        let mut state_rx = readiness.subscribe();
        readiness.set_state(ReadinessState::Ready);
        state_rx.changed().await.unwrap();
        assert_eq!(*state_rx.borrow(), ReadinessState::Ready);
    }

    #[tokio::test]
    async fn test_listen_follows_session_state() {
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Connecting);
        let readiness = Readiness::new();
        let mut state_rx = readiness.subscribe();
        readiness.start_listening(conn_rx);

        state_rx
            .wait_for(|s| *s == ReadinessState::NotReadyYet("Connecting...".into()))
            .await
            .unwrap();

        conn_tx.send(ConnectionState::Open).unwrap();
        state_rx.wait_for(ReadinessState::is_ready).await.unwrap();
        assert!(readiness.current_state().is_ready());
    }
}
