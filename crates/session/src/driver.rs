//! The task that runs a `Session` against a real transport.
//!
//! The driver owns the session and is the only task that touches it. Caller
//! requests, channel callbacks and timers all arrive as `DriverEvent`s
//! on one mpsc queue and are processed strictly one at a time; each yields
//! `Action`s that the driver executes before taking the next event.
//!
//! # Tasks
//!
//! ```text
//!  SessionHandle ──Request───┐
//!  channel task ──Channel────┤
//!  replay timer ──ReplayDue──┼──> events ──> SessionDriver ──> Session
//!  retry timer ──RetryDue────┘                      │
//!                                                   ├─> channel task (open/send/close)
//!                                                   ├─> replay and retry timers
//!                                                   └─> watch<ConnectionState>, broadcast<SessionNotice>
//! ```
//!
//! At most one channel task is live. Opening a new epoch tells the previous
//! task to close, and anything it reports afterwards carries its old epoch,
//! which the session ignores.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    backoff::TimerToken,
    message::Command,
    session::{Action, Epoch, Session, SessionNotice},
    state::ConnectionState,
    transport::{ChannelParts, Transport},
};

/// A caller request forwarded by `SessionHandle`.
#[derive(Debug)]
pub(crate) enum Request {
    Submit(Command),
    Connect,
    ManualReconnect,
    Close,
}

/// What a channel task reports about its channel.
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Opened,
    Frame(String),
    Closed(String),
    Failed(String),
}

#[derive(Debug)]
pub(crate) enum DriverEvent {
    Request(Request),
    Channel { epoch: Epoch, event: ChannelEvent },
    ReplayDue(Epoch),
    RetryDue(TimerToken),
}

enum Outbound {
    Frame(String),
    Close,
}

struct ActiveChannel {
    epoch: Epoch,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl ActiveChannel {
    /// Asks the task to close its channel. Aborts it if it is already gone.
    fn close(self) {
        if self.outbound.send(Outbound::Close).is_err() {
            self.task.abort();
        }
    }
}

pub(crate) struct SessionDriver {
    session: Session,
    transport: Arc<dyn Transport>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    channel: Option<ActiveChannel>,
    replay: Option<JoinHandle<()>>,
    retry: Option<(TimerToken, JoinHandle<()>)>,
    state_tx: watch::Sender<ConnectionState>,
    notices_tx: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,
}

impl SessionDriver {
    pub(crate) fn new(
        session: Session,
        transport: Arc<dyn Transport>,
        events_tx: mpsc::UnboundedSender<DriverEvent>,
        events_rx: mpsc::UnboundedReceiver<DriverEvent>,
        state_tx: watch::Sender<ConnectionState>,
        notices_tx: broadcast::Sender<SessionNotice>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            transport,
            events_tx,
            events_rx,
            channel: None,
            replay: None,
            retry: None,
            state_tx,
            notices_tx,
            cancel,
        }
    }

    /// Processes events until the cancellation token fires.
    pub(crate) async fn run(mut self) {
        info!("Session driver started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, closing session...");
                    let actions = self.session.close();
                    self.execute(actions);
                    break;
                }

                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                }
            }
        }
        self.disarm_replay();
        self.disarm_retry();
        info!("Session driver stopped");
    }

    fn handle(&mut self, event: DriverEvent) {
        trace!("Driver event: {:?}", event);
        let actions = match event {
            DriverEvent::Request(Request::Submit(command)) => self.session.submit(command),
            DriverEvent::Request(Request::Connect) => match self.session.connect() {
                Ok(actions) => actions,
                Err(e) => {
                    warn!("{}", e);
                    vec![Action::Notify(SessionNotice::Rejected {
                        reason: e.to_string(),
                    })]
                }
            },
            DriverEvent::Request(Request::ManualReconnect) => self.session.manual_reconnect(),
            DriverEvent::Request(Request::Close) => self.session.close(),
            DriverEvent::Channel { epoch, event } => match event {
                ChannelEvent::Opened => self.session.channel_opened(epoch),
                ChannelEvent::Frame(frame) => self.session.frame_received(epoch, &frame),
                ChannelEvent::Closed(reason) => self.session.channel_closed(epoch, &reason),
                ChannelEvent::Failed(reason) => self.session.channel_failed(epoch, &reason),
            },
            DriverEvent::ReplayDue(epoch) => self.session.replay_due(epoch),
            DriverEvent::RetryDue(token) => self.session.retry_due(token),
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::OpenChannel { epoch } => self.open_channel(epoch),
                Action::Send { epoch, frame } => match &self.channel {
                    Some(channel) if channel.epoch == epoch => {
                        if channel.outbound.send(Outbound::Frame(frame)).is_err() {
                            debug!("Channel {} task is gone, frame dropped", epoch);
                        }
                    }
                    _ => debug!("No live channel {}, frame dropped", epoch),
                },
                Action::CloseChannel { epoch } => {
                    if self.channel.as_ref().is_some_and(|c| c.epoch == epoch) {
                        if let Some(channel) = self.channel.take() {
                            channel.close();
                        }
                        self.disarm_replay();
                    }
                }
                Action::ArmReplay { epoch, delay } => self.arm_replay(epoch, delay),
                Action::ArmRetry { token, delay } => self.arm_retry(token, delay),
                Action::DisarmRetry { token } => {
                    if self.retry.as_ref().is_some_and(|(armed, _)| *armed == token) {
                        self.disarm_retry();
                    }
                }
                Action::Notify(notice) => self.publish(notice),
            }
        }
    }

    fn publish(&self, notice: SessionNotice) {
        if let SessionNotice::StateChanged { to, .. } = &notice {
            self.state_tx.send_replace(*to);
        }
        // no receivers is fine
        let _ = self.notices_tx.send(notice);
    }

    fn open_channel(&mut self, epoch: Epoch) {
        if let Some(previous) = self.channel.take() {
            debug!("Superseding channel {} with {}", previous.epoch, epoch);
            previous.close();
        }

        let (outbound, requests) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(
            epoch,
            self.transport.clone(),
            requests,
            self.events_tx.clone(),
        ));
        self.channel = Some(ActiveChannel {
            epoch,
            outbound,
            task,
        });
    }

    fn arm_replay(&mut self, epoch: Epoch, delay: Duration) {
        self.disarm_replay();
        let events = self.events_tx.clone();
        self.replay = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DriverEvent::ReplayDue(epoch));
        }));
    }

    fn disarm_replay(&mut self) {
        if let Some(timer) = self.replay.take() {
            timer.abort();
        }
    }

    fn arm_retry(&mut self, token: TimerToken, delay: Duration) {
        self.disarm_retry();
        let events = self.events_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DriverEvent::RetryDue(token));
        });
        self.retry = Some((token, timer));
    }

    fn disarm_retry(&mut self) {
        if let Some((token, timer)) = self.retry.take() {
            trace!("Disarming {}", token);
            timer.abort();
        }
    }
}

/// Owns one channel for its whole life: open, pump frames both ways, close.
async fn run_channel(
    epoch: Epoch,
    transport: Arc<dyn Transport>,
    mut requests: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let report = |event: ChannelEvent| {
        let _ = events.send(DriverEvent::Channel { epoch, event });
    };

    let ChannelParts {
        mut sink,
        mut stream,
    } = tokio::select! {
        opened = transport.open() => match opened {
            Ok(parts) => parts,
            Err(e) => {
                report(ChannelEvent::Failed(e.to_string()));
                return;
            }
        },
        _ = close_requested(&mut requests) => {
            debug!("Channel {} superseded before it opened", epoch);
            return;
        }
    };
    report(ChannelEvent::Opened);

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(frame)) => report(ChannelEvent::Frame(frame)),
                Some(Err(e)) => {
                    report(ChannelEvent::Failed(e.to_string()));
                    break;
                }
                None => {
                    report(ChannelEvent::Closed("closed by server".into()));
                    break;
                }
            },

            request = requests.recv() => match request {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = sink.send(frame).await {
                        report(ChannelEvent::Failed(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        debug!("Channel {} close: {}", epoch, e);
                    }
                    break;
                }
            }
        }
    }
    trace!("Channel {} task finished", epoch);
}

/// Resolves once the driver asks a still-opening channel to close.
async fn close_requested(requests: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match requests.recv().await {
            Some(Outbound::Close) | None => return,
            // frames cannot be addressed to a channel that is not open yet
            Some(Outbound::Frame(_)) => continue,
        }
    }
}
