// src/pipeline/schedule.rs

//! Wall-clock aligned wake-time computation.
//!
//! Next-run state is threaded through loop iterations as an explicit value
//! instead of living in process globals. Ticks are derived by truncating the
//! scheduled time to a wall-clock boundary and adding the configured period,
//! so cycles stay aligned instead of drifting.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Schedule state for the sync loop and the coarser cleanup cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    next_sync: DateTime<Utc>,
    next_cleanup: DateTime<Utc>,
    cycle_period: TimeDelta,
    cleanup_period: TimeDelta,
}

impl Schedule {
    /// Start a schedule where both the first sync and the first cleanup are
    /// due immediately.
    pub fn starting_at(now: DateTime<Utc>, cycle_period: Duration, cleanup_period: Duration) -> Self {
        Self {
            next_sync: now,
            next_cleanup: now,
            cycle_period: TimeDelta::from_std(cycle_period).unwrap_or_else(|_| TimeDelta::zero()),
            cleanup_period: TimeDelta::from_std(cleanup_period)
                .unwrap_or_else(|_| TimeDelta::zero()),
        }
    }

    /// The upcoming sync tick.
    pub fn next_sync(&self) -> DateTime<Utc> {
        self.next_sync
    }

    /// The upcoming cleanup tick.
    pub fn next_cleanup(&self) -> DateTime<Utc> {
        self.next_cleanup
    }

    /// Time remaining until the next sync tick; zero when it is already due.
    pub fn wait_for_sync(&self, now: DateTime<Utc>) -> Duration {
        (self.next_sync - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Consume the current sync tick: the next one is the tick truncated to
    /// the minute plus the cycle period.
    pub fn advance_sync(&mut self) {
        self.next_sync = truncate(self.next_sync, 60) + self.cycle_period;
    }

    /// Whether the cleanup cadence has come due. Checked once per main cycle,
    /// after `advance_sync`.
    pub fn cleanup_due(&self) -> bool {
        self.next_sync > self.next_cleanup
    }

    /// Consume the due cleanup tick: the next one is the upcoming sync tick
    /// truncated to the hour plus the cleanup period.
    pub fn advance_cleanup(&mut self) {
        self.next_cleanup = truncate(self.next_sync, 3600) + self.cleanup_period;
    }
}

/// Truncate a timestamp to a multiple of `step_secs` since the epoch.
fn truncate(t: DateTime<Utc>, step_secs: i64) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(step_secs), 0).unwrap_or(t)
}
