//! # padlink-session: self-healing client session for the pad profile server
//!
//! A persistent, async session over a WebSocket to the FSR pad profile
//! server. It keeps the connection alive and the server in sync:
//!
//! - **Automatic reconnection** with exponential backoff and a retry budget
//! - **Command queueing** while the channel is down, replayed in order on open
//! - **Subscription resync** of the desired event types on every open
//! - **Frame routing** to sensor, profile and presence handlers
//! - **State monitoring** through a watch channel and a notice broadcast
//!
//! # Quick Start
//!
//! ```ignore
//! use padlink_session::{Command, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = SessionManager::new("ws://127.0.0.1:3000/ws")?
//!         .on_sensor_stream(|values| println!("{values:?}"))
//!         .on_profiles_changed(|msg| println!("{}", msg.message))
//!         .build_and_start()?;
//!
//!     // queued until the channel opens
//!     handle.submit(Command::ChangeProfile { name: "Alice".into() })?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Reconnection
//!
//! ```text
//! Attempt 1: wait 1s
//! Attempt 2: wait 2s
//! Attempt 3: wait 4s
//! ...
//! Attempt 6+: wait 30s (capped)
//! ```
//!
//! After `max_reconnect_attempts` failed retries the session enters
//! `Failed` and stays there until `SessionHandle::manual_reconnect`.
//!
//! # Layout
//!
//! `Session` is a synchronous state machine that returns `Action`s; the
//! driver task executes them against a `Transport`. Everything observable
//! about reconnection can be tested without a runtime by feeding `Session`
//! its inputs directly.

pub mod backoff;
pub mod codec;
pub mod config;
pub mod dispatch;
mod driver;
pub mod error;
pub mod manager;
pub mod message;
pub mod queue;
pub mod session;
pub mod state;
pub mod subscription;
pub mod transport;

pub use backoff::{BackoffError, ReconnectScheduler, TimerToken};
pub use codec::{FrameCodec, JsonCodec};
pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{SessionHandle, SessionManager};
pub use message::{
    Command, EventType, Player, Profile, ProfilesSnapshot, ResponseType, SensorValues,
    ServerMessage, Thresholds,
};
pub use queue::CommandQueue;
pub use session::{Action, Epoch, Session, SessionNotice};
pub use state::ConnectionState;
pub use subscription::SubscriptionRegistry;
pub use transport::{MemoryPeer, MemoryTransport, Transport, WebSocketTransport};

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
