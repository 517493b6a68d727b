//! # Temporal Types — Millisecond Timestamps and Clamped Countdowns
//!
//! The remote authority reports instants (expirations, quarantine ends,
//! scheduled processing) as milliseconds since the Unix epoch. The client
//! compares them against its own wall clock, which may be skewed relative to
//! the remote clock by an arbitrary amount.
//!
//! ## Invariant
//!
//! Every delay derived from a remote instant goes through [`remaining`] or
//! [`remaining_bounded`]: `target - now`, clamped to zero from below and to a
//! maximum bound from above. No caller subtracts timestamps directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Upper bound for any timer derived from a remote timestamp.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampMillis(pub u64);

impl TimestampMillis {
    /// Construct from raw milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Raw milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Construct from a UTC datetime. Pre-epoch instants saturate to zero.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(u64::try_from(dt.timestamp_millis()).unwrap_or(0))
    }

    /// Convert to a UTC datetime.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, CoreError> {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or(CoreError::TimestampOutOfRange(self.0))
    }

    /// Add a duration, saturating at `u64::MAX`.
    pub fn saturating_add(&self, d: Duration) -> Self {
        let add = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(add))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(&self, earlier: TimestampMillis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for TimestampMillis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Ok(dt) => f.write_str(&dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
            Err(_) => write!(f, "{}ms", self.0),
        }
    }
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time.
    fn now(&self) -> TimestampMillis;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMillis {
        TimestampMillis::from_datetime(Utc::now())
    }
}

/// A manually driven clock for tests and offline inspection.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: TimestampMillis) -> Self {
        Self {
            now: AtomicU64::new(now.0),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: TimestampMillis) {
        self.now.store(now.0, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        let add = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_add(add)));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimestampMillis {
        TimestampMillis(self.now.load(Ordering::SeqCst))
    }
}

/// Time left until `target`, clamped to `[0, MAX_TIMER_DELAY]`.
pub fn remaining(target: TimestampMillis, now: TimestampMillis) -> Duration {
    remaining_bounded(target, now, MAX_TIMER_DELAY)
}

/// Time left until `target`, clamped to `[0, max]`.
pub fn remaining_bounded(target: TimestampMillis, now: TimestampMillis, max: Duration) -> Duration {
    Duration::from_millis(target.0.saturating_sub(now.0)).min(max)
}

/// A countdown rendered as zero-padded minutes and seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTime {
    /// Whole minutes, at least two digits.
    pub minutes: String,
    /// Whole seconds within the minute, two digits.
    pub seconds: String,
}

impl std::fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.minutes, self.seconds)
    }
}

/// Render a millisecond countdown. Sub-second remainders are truncated.
pub fn millis_to_time(millis: u64) -> RemainingTime {
    let total_secs = millis / 1000;
    RemainingTime {
        minutes: format!("{:02}", total_secs / 60),
        seconds: format!("{:02}", total_secs % 60),
    }
}
