//! Study session stopwatch.
//!
//! Elapsed time is derived from wall-clock deltas between calls rather than
//! from counting ticks, so a process that was suspended for a while still
//! reports the right total on its next tick.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::format::format_clock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    #[error("timer is running; stop it before changing its offset")]
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running {
        since: DateTime<Utc>,
    },
    Paused {
        since: DateTime<Utc>,
    },
}

/// Point-in-time view of the timer for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub elapsed_secs: u64,
    /// Length of every pause so far, the open one included.
    pub pause_secs: Vec<u64>,
}

impl TimerSnapshot {
    /// True while a session is in progress, paused or not.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status != TimerStatus::Stopped
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    #[must_use]
    pub fn total_pause_secs(&self) -> u64 {
        self.pause_secs.iter().sum()
    }

    #[must_use]
    pub fn formatted(&self) -> String {
        format_clock(self.elapsed_secs)
    }
}

/// Final totals captured when a session stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSummary {
    pub elapsed_secs: u64,
    pub total_pause_secs: u64,
    pub pause_count: u32,
}

/// Stopwatch with pause tracking. Every operation takes the current instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyTimer {
    phase: Phase,
    accumulated: Duration,
    pauses: Vec<Duration>,
}

impl Default for StudyTimer {
    fn default() -> Self {
        Self {
            phase: Phase::Stopped,
            accumulated: Duration::zero(),
            pauses: Vec::new(),
        }
    }
}

fn whole_secs(duration: Duration) -> u64 {
    u64::try_from(duration.num_seconds()).unwrap_or(0)
}

fn since(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).max(Duration::zero())
}

impl StudyTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(&self) -> TimerStatus {
        match self.phase {
            Phase::Stopped => TimerStatus::Stopped,
            Phase::Running { .. } => TimerStatus::Running,
            Phase::Paused { .. } => TimerStatus::Paused,
        }
    }

    /// Start counting. Returns false (and changes nothing) if a session is
    /// already in progress.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase != Phase::Stopped {
            return false;
        }
        self.phase = Phase::Running { since: now };
        true
    }

    /// Pause a running timer or resume a paused one. No-op when stopped.
    pub fn toggle_pause(&mut self, now: DateTime<Utc>) -> TimerStatus {
        self.phase = match self.phase {
            Phase::Stopped => Phase::Stopped,
            Phase::Running { since: start } => {
                self.accumulated += since(start, now);
                Phase::Paused { since: now }
            }
            Phase::Paused { since: start } => {
                self.pauses.push(since(start, now));
                Phase::Running { since: now }
            }
        };
        self.status()
    }

    /// Seed the count with time studied elsewhere. Only allowed while stopped.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::Running` if a session is in progress.
    pub fn add_offset(&mut self, secs: u32) -> Result<(), TimerError> {
        if self.phase != Phase::Stopped {
            return Err(TimerError::Running);
        }
        self.accumulated += Duration::seconds(i64::from(secs));
        Ok(())
    }

    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        match self.phase {
            Phase::Running { since: start } => self.accumulated + since(start, now),
            Phase::Stopped | Phase::Paused { .. } => self.accumulated,
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let mut pause_secs: Vec<u64> = self.pauses.iter().copied().map(whole_secs).collect();
        if let Phase::Paused { since: start } = self.phase {
            pause_secs.push(whole_secs(since(start, now)));
        }
        TimerSnapshot {
            status: self.status(),
            elapsed_secs: whole_secs(self.elapsed(now)),
            pause_secs,
        }
    }

    /// Capture the final totals and reset for the next session.
    pub fn stop(&mut self, now: DateTime<Utc>) -> TimerSummary {
        let snapshot = self.snapshot(now);
        let summary = TimerSummary {
            elapsed_secs: snapshot.elapsed_secs,
            total_pause_secs: snapshot.total_pause_secs(),
            pause_count: u32::try_from(snapshot.pause_secs.len()).unwrap_or(u32::MAX),
        };
        *self = Self::default();
        summary
    }
}
