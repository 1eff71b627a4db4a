//! High-level entry point that wires a session to a transport.
//!
//! The `SessionManager` is what applications use. It:
//! 1. Validates the configuration
//! 2. Collects the frame handlers
//! 3. Spawns the driver task
//! 4. Returns a `SessionHandle` for application use
//!
//! # Typical Usage
//!
//! ```ignore
//! let handle = SessionManager::from_config(config)?
//!     .on_sensor_stream(|values| meter.record(values))
//!     .on_profiles_changed(|msg| println!("{}", msg.message))
//!     .build_and_start()?;
//!
//! handle.submit(Command::ChangeProfile { name: "Alice".into() })?;
//! let mut state_rx = handle.subscribe_state();
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;
use validator::Validate;

use super::{
    config::SessionConfig,
    driver::{DriverEvent, Request, SessionDriver},
    error::SessionError,
    message::{Command, SensorValues, ServerMessage},
    session::{Session, SessionNotice},
    state::ConnectionState,
    transport::{Transport, WebSocketTransport},
};

/// Capacity of the notice broadcast; slow observers skip the oldest notices.
const NOTICE_CAPACITY: usize = 64;

/// Builder for a running session.
pub struct SessionManager {
    /// Validated configuration
    config: SessionConfig,

    /// The state machine, handlers already registered
    session: Session,

    /// Cancellation token for coordinating shutdown
    cancel_token: CancellationToken,
}

impl SessionManager {
    /// Creates a manager from an existing configuration struct.
    ///
    /// # Returns
    /// - `Ok(Self)`: Manager ready to start
    /// - `Err(SessionError::ConfigError)`: the configuration failed validation
    pub fn from_config(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let session = Session::new(&config);
        Ok(Self {
            config,
            session,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Creates a manager for `url` with every other setting at its default.
    ///
    /// # Examples
    /// ```ignore
    /// let manager = SessionManager::new("ws://127.0.0.1:3000/ws")?;
    /// ```
    pub fn new(url: impl Into<String>) -> Result<Self, SessionError> {
        Self::from_config(SessionConfig::with_url(url))
    }

    /// Registers the handler for sensor samples.
    pub fn on_sensor_stream<F>(mut self, handler: F) -> Self
    where
        F: FnMut(SensorValues) + Send + 'static,
    {
        self.session.on_sensor_stream(handler);
        self
    }

    /// Registers the handler for command responses and profile snapshots.
    pub fn on_profiles_changed<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&ServerMessage) + Send + 'static,
    {
        self.session.on_profiles_changed(handler);
        self
    }

    /// Registers the handler for active-player broadcasts.
    pub fn on_presence_changed<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&ServerMessage) + Send + 'static,
    {
        self.session.on_presence_changed(handler);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Gets a clone of the cancellation token.
    ///
    /// Cancelling it closes the session and stops the driver.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Starts the session over a WebSocket to the configured URL.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build_and_start(self) -> Result<SessionHandle, SessionError> {
        let transport = Arc::new(WebSocketTransport::new(self.config.url.clone()));
        Ok(self.start_with_transport(transport))
    }

    /// Starts the session over any transport.
    ///
    /// Connects straight away when `connect_on_start` is set; otherwise the
    /// session stays `Disconnected` until `SessionHandle::connect`.
    pub fn start_with_transport(self, transport: Arc<dyn Transport>) -> SessionHandle {
        info!("Starting session for {}", self.config.url);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let driver = SessionDriver::new(
            self.session,
            transport,
            events_tx.clone(),
            events_rx,
            state_tx,
            notices_tx.clone(),
            self.cancel_token.clone(),
        );
        tokio::spawn(driver.run());

        let handle = SessionHandle {
            events: events_tx,
            state_rx,
            notices: notices_tx,
            cancel_token: self.cancel_token,
        };
        if self.config.connect_on_start {
            // the driver was just spawned and holds the receiver
            let _ = handle.connect();
        }
        handle
    }
}

/// Cloneable handle to a running session.
///
/// All requests are fire-and-forget: they are queued to the driver task and
/// take effect in submission order. Outcomes are observed through
/// `subscribe_state()` and `notices()`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<DriverEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    notices: broadcast::Sender<SessionNotice>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    /// Sends `command` now if the channel is open, otherwise queues it for
    /// the next open.
    pub fn submit(&self, command: Command) -> Result<(), SessionError> {
        self.request(Request::Submit(command))
    }

    /// Connects from `Disconnected`. Refusals arrive as
    /// `SessionNotice::Rejected`.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.request(Request::Connect)
    }

    /// Drops the current channel or pending retry and opens a fresh channel.
    pub fn manual_reconnect(&self) -> Result<(), SessionError> {
        self.request(Request::ManualReconnect)
    }

    /// Closes the channel and stays `Disconnected`. Queued commands survive.
    pub fn close(&self) -> Result<(), SessionError> {
        self.request(Request::Close)
    }

    /// Closes the session and stops the driver task.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver that sees every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Receiver for session notices from now on.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn request(&self, request: Request) -> Result<(), SessionError> {
        self.events
            .send(DriverEvent::Request(request))
            .map_err(|_| SessionError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_validates() {
        let config = SessionConfig {
            reconnect_base_delay_ms: 10_000,
            reconnect_max_delay_ms: 10,
            ..Default::default()
        };
        assert!(matches!(
            SessionManager::from_config(config),
            Err(SessionError::ConfigError(_))
        ));
        assert!(SessionManager::new("ws://127.0.0.1:3000/ws").is_ok());
        assert!(SessionManager::new("127.0.0.1:3000").is_err());
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_driver() {
        let (transport, _accepted) = crate::transport::MemoryTransport::new();
        let config = SessionConfig {
            connect_on_start: false,
            ..Default::default()
        };
        let handle = SessionManager::from_config(config)
            .unwrap()
            .start_with_transport(Arc::new(transport));

        assert_eq!(handle.connection_state(), ConnectionState::Disconnected);
        handle.shutdown();

        // wait for the driver to drop its receiver
        let mut state_rx = handle.subscribe_state();
        let _ = state_rx.changed().await;
        assert!(matches!(
            handle.submit(Command::GetCurrentThresholds),
            Err(SessionError::ChannelClosed)
        ));
    }
}
