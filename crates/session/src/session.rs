//! The session state machine.
//!
//! `Session` holds every piece of session state: connection state, channel
//! epoch, reconnect scheduler, command queue, subscription registry and the
//! handlers. It performs no I/O. Each input (a caller request or a channel or
//! timer callback) returns the `Action`s the driver must carry out, so the
//! whole lifecycle can be exercised synchronously in tests.
//!
//! # Epochs
//!
//! Every channel attempt gets a new epoch. Callbacks carry the epoch of the
//! channel that produced them, and anything tagged with an older epoch is
//! ignored. A channel left over from before a manual reconnect therefore
//! cannot drive state.
//!
//! # Inputs and outputs
//!
//! ```text
//!   connect / submit / manual_reconnect / close      (caller)
//!   channel_opened / frame_received / channel_*      (channel, tagged by epoch)
//!   replay_due                                       (timer, tagged by epoch)
//!   retry_due                                        (timer, tagged by token)
//!                 |
//!                 v
//!             Session  ---->  Vec<Action>  ---->  driver
//! ```
//!
//! # Replay
//!
//! Queued commands leave the queue one per `replay_due`, `send_stagger`
//! apart. A command still queued when its channel drops is replayed on the
//! next open. While a replay is running, new submissions queue behind it.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use super::{
    backoff::{ReconnectScheduler, TimerToken},
    codec::{FrameCodec, JsonCodec},
    config::SessionConfig,
    dispatch::{Handlers, Route, classify},
    error::SessionError,
    message::{Command, EventType, SensorValues, ServerMessage},
    queue::CommandQueue,
    state::ConnectionState,
    subscription::SubscriptionRegistry,
};

/// Identifies one channel attempt.
pub type Epoch = u64;

/// Something the driver must do on the session's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a new channel tagged with `epoch`.
    OpenChannel { epoch: Epoch },

    /// Write `frame` on the channel of `epoch`.
    ///
    /// Frames for the same channel are written in the order they were
    /// emitted.
    Send { epoch: Epoch, frame: String },

    /// Close the channel of `epoch` if it is still around.
    CloseChannel { epoch: Epoch },

    /// Call `Session::replay_due(epoch)` after `delay`.
    ArmReplay { epoch: Epoch, delay: Duration },

    /// Arm the retry timer; report it back through `Session::retry_due`.
    ArmRetry { token: TimerToken, delay: Duration },

    /// Disarm a retry timer that is no longer wanted.
    DisarmRetry { token: TimerToken },

    /// Publish a notice to observers.
    Notify(SessionNotice),
}

/// Observable events for presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A request was refused; the state did not change.
    Rejected { reason: String },
    /// An inbound frame could not be decoded and was dropped.
    MalformedFrame { reason: String },
    RetryScheduled { attempt: u32, delay: Duration },
    /// The retry budget is spent; only a manual reconnect leaves `Failed`.
    RetriesExhausted { attempts: u32 },
    /// The desired subscription set changed.
    SubscriptionsChanged { subscribed: Vec<EventType> },
}

pub struct Session {
    state: ConnectionState,
    epoch: Epoch,
    scheduler: ReconnectScheduler,
    queue: CommandQueue,
    subscriptions: SubscriptionRegistry,
    codec: Box<dyn FrameCodec>,
    handlers: Handlers,
    send_stagger: Duration,
    auto_start_stream: bool,
    /// StartSensorStream still owed to the current channel.
    auto_start_pending: bool,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            scheduler: config.scheduler(),
            queue: CommandQueue::new(),
            subscriptions: SubscriptionRegistry::new(config.subscriptions.iter().copied()),
            codec: Box::new(JsonCodec),
            handlers: Handlers::default(),
            send_stagger: config.send_stagger(),
            auto_start_stream: config.auto_start_stream,
            auto_start_pending: false,
        }
    }

    /// Replaces the frame codec.
    pub fn with_codec(mut self, codec: impl FrameCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn on_sensor_stream<F>(&mut self, handler: F)
    where
        F: FnMut(SensorValues) + Send + 'static,
    {
        self.handlers.set_sensor(Box::new(handler));
    }

    pub fn on_profiles_changed<F>(&mut self, handler: F)
    where
        F: FnMut(&ServerMessage) + Send + 'static,
    {
        self.handlers.set_profiles(Box::new(handler));
    }

    pub fn on_presence_changed<F>(&mut self, handler: F)
    where
        F: FnMut(&ServerMessage) + Send + 'static,
    {
        self.handlers.set_presence(Box::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Epoch of the newest channel attempt.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn scheduler(&self) -> &ReconnectScheduler {
        &self.scheduler
    }

    /// Starts a connection from `Disconnected`.
    ///
    /// # Returns
    /// - `Ok(actions)`: open a channel for the new epoch
    /// - `Err(SessionError::Rejected)`: an attempt is already in flight or
    ///   scheduled, the channel is open, or the session has `Failed`
    pub fn connect(&mut self) -> Result<Vec<Action>, SessionError> {
        let reason = match self.state {
            ConnectionState::Disconnected => {
                let mut actions = Vec::new();
                self.open_channel(&mut actions);
                return Ok(actions);
            }
            ConnectionState::Connecting => "a connection attempt is already in flight",
            ConnectionState::Reconnecting => "a reconnect is already scheduled",
            ConnectionState::Open => "the channel is already open",
            ConnectionState::Failed => "retries are exhausted, use manual reconnect",
        };
        debug!("Connect rejected in state {}: {}", self.state, reason);
        Err(SessionError::Rejected(reason.to_string()))
    }

    /// Sends a command now if the channel is open and idle, otherwise
    /// queues it.
    ///
    /// `Subscribe`/`Unsubscribe` update the registry immediately either way.
    /// An explicit stream control cancels a pending auto-start.
    pub fn submit(&mut self, command: Command) -> Vec<Action> {
        let mut actions = Vec::new();
        self.track_intent(&command, &mut actions);
        if command.is_stream_control() {
            self.auto_start_pending = false;
        }

        if self.state.is_open() && !self.replaying() {
            self.push_send(&command, &mut actions);
        } else {
            debug!(
                "Queueing {} while {} ({} pending)",
                command.tag(),
                self.state,
                self.queue.len() + 1
            );
            self.queue.enqueue(command);
        }
        actions
    }

    /// Handles a completed channel open.
    ///
    /// Resyncs subscriptions, then starts the replay: queued commands go out
    /// `send_stagger` apart, followed by StartSensorStream unless the queue
    /// already controls the stream.
    pub fn channel_opened(&mut self, epoch: Epoch) -> Vec<Action> {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            debug!("Ignoring open of stale channel {}", epoch);
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(token) = self.scheduler.reset() {
            actions.push(Action::DisarmRetry { token });
        }
        self.transition(ConnectionState::Open, &mut actions);
        info!("Channel {} open", epoch);

        let desired = self.subscriptions.desired();
        if !desired.is_empty() {
            self.push_send(&Command::subscribe(desired), &mut actions);
        }

        self.auto_start_pending =
            self.auto_start_stream && !self.queue.iter().any(Command::is_stream_control);
        if !self.queue.is_empty() {
            info!("Replaying {} queued command(s)", self.queue.len());
        }
        self.arm_replay(&mut actions);

        actions
    }

    /// Sends the next queued command on the channel of `epoch`, or the
    /// owed StartSensorStream once the queue is empty.
    pub fn replay_due(&mut self, epoch: Epoch) -> Vec<Action> {
        if epoch != self.epoch || !self.state.is_open() {
            debug!("Ignoring replay for stale channel {}", epoch);
            return Vec::new();
        }

        let mut actions = Vec::new();
        if let Some(command) = self.queue.dequeue() {
            self.push_send(&command, &mut actions);
        } else if std::mem::take(&mut self.auto_start_pending) {
            self.push_send(&Command::StartSensorStream, &mut actions);
        }
        self.arm_replay(&mut actions);
        actions
    }

    /// Handles one inbound text frame.
    pub fn frame_received(&mut self, epoch: Epoch, frame: &str) -> Vec<Action> {
        if epoch != self.epoch || !self.state.is_open() {
            trace!("Dropping frame from stale channel {}", epoch);
            return Vec::new();
        }

        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed frame dropped: {}", e);
                return vec![Action::Notify(SessionNotice::MalformedFrame {
                    reason: e.to_string(),
                })];
            }
        };

        let mut actions = Vec::new();
        if self.subscriptions.apply(&message.message) {
            debug!("Server acknowledged: {}", message.message);
            actions.push(self.subscriptions_notice());
        }

        let route = classify(&message);
        if !self.handlers.dispatch(route, &message) {
            match route {
                Route::Unrouted => debug!(
                    "Unrouted frame ({:?}): {}",
                    message.response_type, message.message
                ),
                _ => trace!("No handler for {:?}", route),
            }
        }

        actions
    }

    /// Handles the channel of `epoch` closing.
    pub fn channel_closed(&mut self, epoch: Epoch, reason: &str) -> Vec<Action> {
        self.channel_lost(epoch, "closed", reason)
    }

    /// Handles the channel of `epoch` failing, including a failed open.
    pub fn channel_failed(&mut self, epoch: Epoch, reason: &str) -> Vec<Action> {
        self.channel_lost(epoch, "failed", reason)
    }

    /// Handles a retry timer elapsing.
    pub fn retry_due(&mut self, token: TimerToken) -> Vec<Action> {
        if !self.scheduler.fire(token) {
            debug!("Ignoring stale {}", token);
            return Vec::new();
        }
        if self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }

        info!(
            "Reconnect attempt {}/{}",
            self.scheduler.attempt(),
            self.scheduler.max_attempts()
        );
        let mut actions = Vec::new();
        self.open_channel(&mut actions);
        actions
    }

    /// Abandons whatever is in progress and opens a fresh channel.
    ///
    /// Valid in every state. Resets the retry budget; this is the only way
    /// out of `Failed`.
    pub fn manual_reconnect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(token) = self.scheduler.reset() {
            actions.push(Action::DisarmRetry { token });
        }
        if self.state.has_channel() {
            actions.push(Action::CloseChannel { epoch: self.epoch });
        }
        info!("Manual reconnect from {}", self.state);
        self.open_channel(&mut actions);
        actions
    }

    /// Stops everything and goes to `Disconnected`.
    ///
    /// Queued commands are kept for the next open.
    pub fn close(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(token) = self.scheduler.cancel() {
            actions.push(Action::DisarmRetry { token });
        }
        if self.state.has_channel() {
            actions.push(Action::CloseChannel { epoch: self.epoch });
        }
        self.epoch += 1;
        self.transition(ConnectionState::Disconnected, &mut actions);
        if !self.queue.is_empty() {
            info!("Closed with {} command(s) still queued", self.queue.len());
        }
        actions
    }

    fn replaying(&self) -> bool {
        !self.queue.is_empty() || self.auto_start_pending
    }

    fn arm_replay(&self, actions: &mut Vec<Action>) {
        if self.replaying() {
            actions.push(Action::ArmReplay {
                epoch: self.epoch,
                delay: self.send_stagger,
            });
        }
    }

    fn open_channel(&mut self, actions: &mut Vec<Action>) {
        self.epoch += 1;
        self.transition(ConnectionState::Connecting, actions);
        actions.push(Action::OpenChannel { epoch: self.epoch });
    }

    fn channel_lost(&mut self, epoch: Epoch, how: &str, reason: &str) -> Vec<Action> {
        if epoch != self.epoch || !self.state.has_channel() {
            debug!("Ignoring {} report from stale channel {}", how, epoch);
            return Vec::new();
        }

        let mut actions = vec![Action::CloseChannel { epoch }];
        match self.scheduler.schedule() {
            Ok(retry) => {
                warn!(
                    "Channel {} {}: {}. Reconnecting in {:?} (attempt {}/{})",
                    epoch,
                    how,
                    reason,
                    retry.delay,
                    retry.attempt,
                    self.scheduler.max_attempts()
                );
                if let Some(token) = retry.cancelled {
                    actions.push(Action::DisarmRetry { token });
                }
                self.transition(ConnectionState::Reconnecting, &mut actions);
                actions.push(Action::ArmRetry {
                    token: retry.token,
                    delay: retry.delay,
                });
                actions.push(Action::Notify(SessionNotice::RetryScheduled {
                    attempt: retry.attempt,
                    delay: retry.delay,
                }));
            }
            Err(e) => {
                error!("Channel {} {}: {}. Giving up: {}", epoch, how, reason, e);
                self.transition(ConnectionState::Failed, &mut actions);
                actions.push(Action::Notify(SessionNotice::RetriesExhausted {
                    attempts: self.scheduler.max_attempts(),
                }));
            }
        }
        actions
    }

    fn transition(&mut self, to: ConnectionState, actions: &mut Vec<Action>) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        debug!("State {} -> {}", from, to);
        actions.push(Action::Notify(SessionNotice::StateChanged { from, to }));
    }

    fn track_intent(&mut self, command: &Command, actions: &mut Vec<Action>) {
        let changed = match command {
            Command::Subscribe { event_types } => self.subscriptions.subscribe(event_types),
            Command::Unsubscribe { event_types } => self.subscriptions.unsubscribe(event_types),
            _ => false,
        };
        if changed {
            actions.push(self.subscriptions_notice());
        }
    }

    fn subscriptions_notice(&self) -> Action {
        Action::Notify(SessionNotice::SubscriptionsChanged {
            subscribed: self.subscriptions.desired(),
        })
    }

    fn push_send(&self, command: &Command, actions: &mut Vec<Action>) {
        match self.codec.encode(command) {
            Ok(frame) => actions.push(Action::Send {
                epoch: self.epoch,
                frame,
            }),
            Err(e) => error!("Dropping {}: {}", command.tag(), e),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("attempt", &self.scheduler.attempt())
            .field("queued", &self.queue.len())
            .field("subscriptions", &self.subscriptions)
            .field("handlers", &self.handlers)
            .finish()
    }
}
