use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use study_core::timer::{StudyTimer, TimerError, TimerSnapshot, TimerStatus, TimerSummary};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::Clock;

const TICK: StdDuration = StdDuration::from_secs(1);

struct TimerState {
    clock: Clock,
    timer: StudyTimer,
}

impl TimerState {
    fn snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot(self.clock.now())
    }
}

/// The single study stopwatch of the app.
///
/// Every change is published on a watch channel so a display can follow the
/// timer without polling it.
#[derive(Clone)]
pub struct TimerService {
    state: Arc<Mutex<TimerState>>,
    snapshots: Arc<watch::Sender<TimerSnapshot>>,
}

impl TimerService {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        let timer = StudyTimer::new();
        let (snapshots, _) = watch::channel(timer.snapshot(clock.now()));
        Self {
            state: Arc::new(Mutex::new(TimerState { clock, timer })),
            snapshots: Arc::new(snapshots),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: TimerSnapshot) -> TimerSnapshot {
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    /// Start a session. Returns false if one is already in progress.
    pub fn start(&self) -> bool {
        let (started, snapshot) = {
            let mut state = self.state();
            let now = state.clock.now();
            (state.timer.start(now), state.snapshot())
        };
        if started {
            info!(offset_secs = snapshot.elapsed_secs, "study timer started");
            self.publish(snapshot);
        }
        started
    }

    pub fn toggle_pause(&self) -> TimerStatus {
        let snapshot = {
            let mut state = self.state();
            let now = state.clock.now();
            state.timer.toggle_pause(now);
            state.snapshot()
        };
        debug!(status = ?snapshot.status, elapsed_secs = snapshot.elapsed_secs, "timer toggled");
        self.publish(snapshot).status
    }

    /// # Errors
    ///
    /// Returns `TimerError::Running` while a session is in progress.
    pub fn add_offset(&self, secs: u32) -> Result<(), TimerError> {
        let snapshot = {
            let mut state = self.state();
            state.timer.add_offset(secs)?;
            state.snapshot()
        };
        self.publish(snapshot);
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        self.state().snapshot()
    }

    /// Finish the session and reset. Read the totals from the result; the
    /// timer itself no longer has them.
    pub fn stop(&self) -> TimerSummary {
        let (summary, snapshot) = {
            let mut state = self.state();
            let now = state.clock.now();
            let summary = state.timer.stop(now);
            (summary, state.snapshot())
        };
        info!(
            elapsed_secs = summary.elapsed_secs,
            pause_secs = summary.total_pause_secs,
            pauses = summary.pause_count,
            "study timer stopped"
        );
        self.publish(snapshot);
        summary
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    /// Publish the current reading.
    pub fn tick(&self) -> TimerSnapshot {
        let snapshot = self.snapshot();
        self.publish(snapshot)
    }

    /// Publish a reading once per second until the timer is stopped.
    ///
    /// Spawn after `start`; the task ends at its first tick on a stopped
    /// timer.
    #[must_use]
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !service.tick().is_running() {
                    debug!("timer ticker finished");
                    break;
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn advance(&self, delta: chrono::Duration) {
        self.state().clock.advance(delta);
    }
}
