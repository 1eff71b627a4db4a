//! Log output for frames the session routes to the application.
//!
//! Sensor readings arrive many times per second, so they are summarised
//! per interval instead of logged one by one. Profile responses and player
//! broadcasts are logged as they come.

use std::time::{Duration, Instant};

use padlink_session::{
    ProfilesSnapshot, SensorValues, ServerMessage, SessionNotice, message::SENSOR_COUNT,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Default interval between sensor summaries.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// One interval's worth of sensor readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSummary {
    pub samples: u64,
    pub elapsed: Duration,
    pub last: SensorValues,
    pub peak: SensorValues,
}

impl SensorSummary {
    /// Samples per second over the interval.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }
}

/// Accumulates sensor readings and yields a summary once per interval.
#[derive(Debug)]
pub struct SensorMeter {
    interval: Duration,
    window_start: Instant,
    samples: u64,
    last: SensorValues,
    peak: SensorValues,
}

impl SensorMeter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            samples: 0,
            last: [0; SENSOR_COUNT],
            peak: [0; SENSOR_COUNT],
        }
    }

    pub fn record(&mut self, values: SensorValues) -> Option<SensorSummary> {
        self.record_at(values, Instant::now())
    }

    /// Adds one reading. Returns the finished window when `now` is at least
    /// one interval past its start.
    pub fn record_at(&mut self, values: SensorValues, now: Instant) -> Option<SensorSummary> {
        self.samples += 1;
        self.last = values;
        for (peak, value) in self.peak.iter_mut().zip(values) {
            *peak = (*peak).max(value);
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let summary = SensorSummary {
            samples: self.samples,
            elapsed,
            last: self.last,
            peak: self.peak,
        };
        *self = Self::starting_at(self.interval, now);
        Some(summary)
    }
}

/// One-line description of a profile snapshot.
pub fn describe_snapshot(snapshot: &ProfilesSnapshot) -> String {
    let thresholds = snapshot
        .current_thresholds()
        .map(|t| format!("{:?}", t))
        .unwrap_or_else(|| "none".to_string());

    let mut text = format!(
        "profile '{}' {} of {}, default '{}'",
        snapshot.current_profile,
        thresholds,
        snapshot.profiles.len(),
        snapshot.default_profile
    );
    if !snapshot.current_player.is_empty() {
        text.push_str(&format!(", player '{}'", snapshot.current_player));
    }
    text
}

/// Remembers the active player so repeated broadcasts are not re-logged.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    current: Option<String>,
}

impl PresenceTracker {
    /// Returns the player name when `message` announces a different one.
    pub fn update(&mut self, message: &ServerMessage) -> Option<&str> {
        let player = &message.data.as_ref()?.current_player;
        if self.current.as_ref() == Some(player) {
            return None;
        }
        self.current = Some(player.clone());
        self.current.as_deref()
    }
}

/// Sensor handler that logs every reading at trace and a summary at info.
pub fn sensor_handler(interval: Duration) -> impl FnMut(SensorValues) + Send + 'static {
    let mut meter = SensorMeter::new(interval);
    move |values| {
        trace!(?values, "Sensor reading");
        if let Some(summary) = meter.record(values) {
            info!(
                "Sensors: {} samples ({:.1}/s), last {:?}, peak {:?}",
                summary.samples,
                summary.rate(),
                summary.last,
                summary.peak
            );
        }
    }
}

/// Handler for command responses and stream stops.
pub fn profiles_handler() -> impl FnMut(&ServerMessage) + Send + 'static {
    |message: &ServerMessage| {
        if !message.success {
            warn!("Server: {}", message.message);
            return;
        }
        match &message.data {
            Some(snapshot) => info!("Server: {} ({})", message.message, describe_snapshot(snapshot)),
            None => info!("Server: {}", message.message),
        }
        if let Some(values) = message.sensor_values() {
            info!("Sensor values: {:?}", values);
        }
    }
}

/// Handler for active player broadcasts.
pub fn presence_handler() -> impl FnMut(&ServerMessage) + Send + 'static {
    let mut tracker = PresenceTracker::default();
    move |message: &ServerMessage| match tracker.update(message) {
        Some(player) if player.is_empty() => info!("No active player"),
        Some(player) => info!("Active player: {}", player),
        None => debug!("Player broadcast without change"),
    }
}

/// Logs the session notices an operator has to act on.
pub fn log_notice(notice: &SessionNotice) {
    match notice {
        SessionNotice::Rejected { reason } => warn!("Request rejected: {}", reason),
        SessionNotice::RetriesExhausted { attempts } => error!(
            "Server unreachable after {} attempts, type 'reconnect' to try again",
            attempts
        ),
        SessionNotice::SubscriptionsChanged { subscribed } => {
            let names: Vec<&str> = subscribed.iter().map(|e| e.as_str()).collect();
            info!("Subscribed to: [{}]", names.join(", "));
        }
        other => trace!("Notice: {:?}", other),
    }
}

/// Follows the notice broadcast until shutdown or until the session is gone.
pub async fn follow_notices(
    mut notices: broadcast::Receiver<SessionNotice>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            notice = notices.recv() => match notice {
                Ok(notice) => log_notice(&notice),
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} notices", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }
}
