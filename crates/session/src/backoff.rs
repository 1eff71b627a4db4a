//! Exponential backoff and retry-timer bookkeeping for reconnection.
//!
//! When the channel drops, the session does not reopen it straight away; it
//! asks the `ReconnectScheduler` for the next delay and arms a single retry
//! timer. The scheduler owns the attempt counter, the retry budget and the
//! token of the one timer that may be pending.
//!
//! # Algorithm
//!
//! The attempt counter is incremented before the delay is computed:
//! ```text
//! delay[n] = min(base * 2^(n-1), max_delay)
//! ```
//!
//! With the defaults (base=1s, max=30s):
//! - Attempt 1: wait 1s
//! - Attempt 2: wait 2s
//! - Attempt 3: wait 4s
//! - ...
//! - Attempt 6+: wait 30s (capped)
//!
//! No jitter is applied. Once `attempt >= max_attempts` nothing more is
//! scheduled and the caller is expected to enter `Failed`.
//!
//! # Timer tokens
//!
//! Every scheduled retry gets a fresh `TimerToken`. A timer firing is only
//! honoured if its token is still the pending one; anything else belongs to a
//! retry that was cancelled by `reset()` or replaced by a newer `schedule()`.
//!
//! # Examples
//!
//! ```ignore
//! use std::time::Duration;
//! use padlink_session::backoff::ReconnectScheduler;
//!
//! let mut scheduler = ReconnectScheduler::new(Duration::from_millis(500), Duration::from_secs(8), 5);
//!
//! let retry = scheduler.schedule().unwrap();
//! assert_eq!(retry.delay, Duration::from_millis(500));
//!
//! // Timer fires
//! assert!(scheduler.fire(retry.token));
//!
//! // Connection succeeds
//! scheduler.reset();
//! assert_eq!(scheduler.attempt(), 0);
//! ```

use std::{fmt, time::Duration};

use thiserror::Error;

/// Error type for backoff exhaustion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackoffError {
    /// Maximum retry attempts exceeded with the given limit.
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// Identifies one scheduled retry timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A retry the caller must arm a timer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Token to report back through `fire()` when the delay elapses.
    pub token: TimerToken,

    /// How long to wait before reopening the channel.
    pub delay: Duration,

    /// The attempt number this retry represents (1-based).
    pub attempt: u32,

    /// A previously pending timer that this retry replaces, if any.
    pub cancelled: Option<TimerToken>,
}

/// Exponential backoff controller with a single pending timer.
///
/// The scheduler is plain data; it never sleeps itself. The driver arms the
/// real timer and reports it back through `fire()`.
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    /// Delay before the first retry.
    base_delay: Duration,

    /// Cap on any single delay.
    max_delay: Duration,

    /// Number of automatic retries before giving up.
    max_attempts: u32,

    /// Retries made since the last successful open or reset (0 before the first).
    attempt: u32,

    /// The one timer that may currently be armed.
    pending: Option<TimerToken>,

    /// Source for fresh timer tokens.
    next_token: u64,
}

impl ReconnectScheduler {
    /// Creates a new scheduler.
    ///
    /// # Arguments
    /// - `base_delay`: delay before the first retry
    /// - `max_delay`: cap on any single delay
    /// - `max_attempts`: automatic retries allowed before `schedule()` errors
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            attempt: 0,
            pending: None,
            next_token: 0,
        }
    }

    /// Computes the delay for a given 1-based attempt without touching state.
    ///
    /// Attempt 0 is treated as attempt 1. Large exponents saturate at
    /// `max_delay` instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
        let millis = self
            .base_delay
            .as_millis()
            .saturating_mul(factor)
            .min(self.max_delay.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Advances the attempt counter and returns the next retry to arm.
    ///
    /// Any timer still pending is replaced; its token is reported in
    /// `ScheduledRetry::cancelled` so the caller can disarm it.
    ///
    /// # Returns
    /// - `Ok(ScheduledRetry)`: arm a timer for `delay`, then call `fire(token)`
    /// - `Err(BackoffError)`: the retry budget is spent; nothing was scheduled
    pub fn schedule(&mut self) -> Result<ScheduledRetry, BackoffError> {
        if self.attempt >= self.max_attempts {
            return Err(BackoffError::MaxAttemptLimitError(self.max_attempts));
        }

        self.attempt += 1;
        let delay = self.delay_for(self.attempt);

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let cancelled = self.pending.replace(token);

        Ok(ScheduledRetry {
            token,
            delay,
            attempt: self.attempt,
            cancelled,
        })
    }

    /// Consumes a timer firing.
    ///
    /// Returns true if `token` is the pending timer (which is then cleared).
    /// Stale tokens from cancelled or replaced timers return false.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        if self.pending == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Disarms the pending timer without touching the attempt counter.
    pub fn cancel(&mut self) -> Option<TimerToken> {
        self.pending.take()
    }

    /// Resets to the initial state.
    ///
    /// Called on a successful open and on manual reconnect. Returns the token
    /// of a timer that was still pending so the caller can disarm it.
    pub fn reset(&mut self) -> Option<TimerToken> {
        self.attempt = 0;
        self.pending.take()
    }

    /// Retries made since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The currently armed timer, if any.
    pub fn pending(&self) -> Option<TimerToken> {
        self.pending
    }

    /// True once no further retry may be scheduled.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl Default for ReconnectScheduler {
    /// 1 second base, 30 second cap, 10 attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 10)
    }
}
