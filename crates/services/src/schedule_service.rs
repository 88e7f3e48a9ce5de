//! Weekly plan and daily progress, kept locally and synced best-effort.
//!
//! The tracker owns one copy of the plan and the progress. Remote calls
//! happen outside the lock; local state changes either optimistically with a
//! `ProgressToggle` that can be reverted, or only after the backend accepted
//! the change. Every accepted change is written through to the local cache so
//! the next start has something to show when the backend is unreachable.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use storage::repository::LocalCache;
use study_core::model::{
    DailyProgress, DayOfWeek, PlanError, ProgressToggle, RecordEntry, SlotId, Subject,
    SubjectSlot, WeeklyPlan,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Clock;
use crate::backend::StudyBackend;
use crate::error::ScheduleError;

/// Where a load got its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Remote,
    Cache,
    /// Neither the backend nor the cache had anything; state was reset.
    Empty,
}

#[derive(Debug, Default)]
struct TrackerState {
    plan: WeeklyPlan,
    progress: DailyProgress,
}

/// A plan slot with its completion state for one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub slot: SubjectSlot,
    pub completed: bool,
}

#[derive(Clone)]
pub struct ScheduleTracker {
    clock: Clock,
    backend: Arc<dyn StudyBackend>,
    cache: Arc<dyn LocalCache>,
    state: Arc<Mutex<TrackerState>>,
}

impl ScheduleTracker {
    #[must_use]
    pub fn new(clock: Clock, backend: Arc<dyn StudyBackend>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            clock,
            backend,
            cache,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn plan(&self) -> WeeklyPlan {
        self.state().plan.clone()
    }

    #[must_use]
    pub fn progress(&self) -> DailyProgress {
        self.state().progress.clone()
    }

    #[must_use]
    pub fn is_completed(&self, date: NaiveDate, slot: SlotId) -> bool {
        self.state().progress.is_completed(date, slot)
    }

    /// Slots planned for `date`, in plan order.
    #[must_use]
    pub fn slots_on(&self, date: NaiveDate) -> Vec<SlotStatus> {
        let state = self.state();
        state
            .plan
            .slots_on(date)
            .iter()
            .map(|slot| SlotStatus {
                slot: slot.clone(),
                completed: state.progress.is_completed(date, slot.id),
            })
            .collect()
    }

    #[must_use]
    pub fn today(&self) -> Vec<SlotStatus> {
        self.slots_on(self.clock.today())
    }

    //
    // ─── LOADING ───────────────────────────────────────────────────────────────
    //

    /// Load the plan, then the progress (which is pruned against the plan).
    pub async fn load(&self) -> (PlanSource, PlanSource) {
        let plan = self.load_plan().await;
        let progress = self.load_progress().await;
        (plan, progress)
    }

    /// Replace the local plan with the backend's, falling back to the cache
    /// and then to an empty week.
    pub async fn load_plan(&self) -> PlanSource {
        let (plan, source) = match self.backend.fetch_plan().await {
            Ok(plan) => {
                self.cache_plan(&plan).await;
                (plan, PlanSource::Remote)
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch weekly plan; using local cache");
                match self.cache.load_plan().await {
                    Ok(Some(plan)) => (plan, PlanSource::Cache),
                    Ok(None) => (WeeklyPlan::empty(), PlanSource::Empty),
                    Err(err) => {
                        warn!(error = %err, "failed to read cached weekly plan");
                        (WeeklyPlan::empty(), PlanSource::Empty)
                    }
                }
            }
        };

        let pruned = {
            let mut state = self.state();
            let pruned = state.progress.retain_known(&plan);
            state.plan = plan;
            pruned
        };
        if pruned > 0 {
            debug!(pruned, "dropped progress for slots no longer in the plan");
            self.persist_progress().await;
        }
        debug!(?source, "loaded weekly plan");
        source
    }

    /// Replace local progress with the backend's, falling back to the cache.
    pub async fn load_progress(&self) -> PlanSource {
        let (mut progress, source) = match self.backend.fetch_progress().await {
            Ok(progress) => (progress, PlanSource::Remote),
            Err(err) => {
                warn!(error = %err, "failed to fetch daily progress; using local cache");
                match self.cache.load_progress().await {
                    Ok(Some(progress)) => (progress, PlanSource::Cache),
                    Ok(None) => (DailyProgress::new(), PlanSource::Empty),
                    Err(err) => {
                        warn!(error = %err, "failed to read cached daily progress");
                        (DailyProgress::new(), PlanSource::Empty)
                    }
                }
            }
        };

        {
            let mut state = self.state();
            progress.retain_known(&state.plan);
            state.progress = progress;
        }
        if source == PlanSource::Remote {
            self.persist_progress().await;
        }
        debug!(?source, "loaded daily progress");
        source
    }

    //
    // ─── PLAN EDITING ──────────────────────────────────────────────────────────
    //

    /// Append `subject` to `day` with a fresh local slot id. Not saved until
    /// `save_plan`.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Plan` if the subject name is blank.
    pub fn add_slot(&self, day: DayOfWeek, subject: &Subject) -> Result<SlotId, ScheduleError> {
        let id = self.state().plan.add_slot(day, subject.id, &subject.name)?;
        Ok(id)
    }

    /// Remove a slot and every completion recorded for it.
    pub fn remove_slot(&self, day: DayOfWeek, slot: SlotId) -> bool {
        let mut state = self.state();
        let removed = state.plan.remove_slot(day, slot).is_some();
        if removed {
            state.progress.forget_slot(slot);
        }
        removed
    }

    /// Replace the whole local plan, e.g. after an editor session.
    pub fn set_plan(&self, plan: WeeklyPlan) {
        let mut state = self.state();
        state.progress.retain_known(&plan);
        state.plan = plan;
    }

    /// Push the local plan and adopt the backend's canonical copy.
    ///
    /// Progress follows slots whose ids the backend reassigned, matched by
    /// day and position. On failure the local edit stays (and is cached).
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Api` if the backend rejects the plan.
    pub async fn save_plan(&self) -> Result<(), ScheduleError> {
        let local = self.plan();
        let canonical = match self.backend.save_plan(&local).await {
            Ok(canonical) => canonical,
            Err(err) => {
                warn!(error = %err, "failed to save weekly plan; keeping local edit");
                self.cache_plan(&local).await;
                return Err(err.into());
            }
        };

        let mapping = local.id_mapping_to(&canonical);
        {
            let mut state = self.state();
            state.progress.remap(&mapping);
            state.progress.retain_known(&canonical);
            state.plan = canonical.clone();
        }
        info!(slots = canonical.slot_count(), "saved weekly plan");
        self.cache_plan(&canonical).await;
        self.persist_progress().await;
        Ok(())
    }

    //
    // ─── PROGRESS ──────────────────────────────────────────────────────────────
    //

    fn apply_toggle(&self, date: NaiveDate, slot: SlotId) -> Result<ProgressToggle, ScheduleError> {
        let mut state = self.state();
        if !state.plan.contains_slot(slot) {
            return Err(PlanError::UnknownSlot(slot).into());
        }
        Ok(ProgressToggle::apply(&mut state.progress, date, slot))
    }

    async fn confirm_toggle(&self, toggle: ProgressToggle) -> Result<bool, ScheduleError> {
        let completed = toggle.completed();
        match self
            .backend
            .set_completion(toggle.date(), toggle.slot(), completed)
            .await
        {
            Ok(()) => {
                self.persist_progress().await;
                Ok(completed)
            }
            Err(err) => {
                {
                    let mut state = self.state();
                    // The slot may have been removed while the call was in flight.
                    if state.plan.contains_slot(toggle.slot()) {
                        toggle.revert(&mut state.progress);
                    }
                }
                warn!(
                    error = %err,
                    date = %toggle.date(),
                    slot = %toggle.slot(),
                    "failed to sync completion; reverted"
                );
                Err(err.into())
            }
        }
    }

    /// Flip a slot's completion for `date`, confirm it with the backend and
    /// revert the flip if the backend refuses. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Plan` (without touching progress) for a slot
    /// that is not in the plan, or `ScheduleError::Api` after reverting.
    pub async fn toggle_completion(
        &self,
        date: NaiveDate,
        slot: SlotId,
    ) -> Result<bool, ScheduleError> {
        let toggle = self.apply_toggle(date, slot)?;
        self.confirm_toggle(toggle).await
    }

    /// Flip a slot's completion now and confirm it in the background.
    ///
    /// The local change is visible as soon as this returns; the handle
    /// resolves once the backend answered (and the flip was reverted if it
    /// refused). Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Plan` for a slot that is not in the plan.
    pub fn spawn_toggle(
        &self,
        date: NaiveDate,
        slot: SlotId,
    ) -> Result<JoinHandle<Result<bool, ScheduleError>>, ScheduleError> {
        let toggle = self.apply_toggle(date, slot)?;
        let tracker = self.clone();
        Ok(tokio::spawn(async move {
            tracker.confirm_toggle(toggle).await
        }))
    }

    /// Mark today's slots complete for the subjects studied today.
    ///
    /// Each of today's active records completes the first slot with the same
    /// subject name that no earlier record claimed. Existing completions are
    /// kept. The day is pushed in one call and only applied locally once the
    /// backend accepted it. Returns today's completed slots.
    ///
    /// Two slots for the same subject are told apart only by order, so a
    /// record can land on a different one than the student had in mind.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Api` if the push fails; local state is unchanged.
    pub async fn sync_with_records(
        &self,
        records: &[RecordEntry],
    ) -> Result<BTreeSet<SlotId>, ScheduleError> {
        let today = self.clock.today();
        let mut completed = {
            let state = self.state();
            let slots = state.plan.slots_on(today);
            let mut claimed = BTreeSet::new();
            for entry in records
                .iter()
                .filter(|entry| entry.record.active && entry.record.local_date() == today)
            {
                if let Some(slot) = slots
                    .iter()
                    .find(|slot| !claimed.contains(&slot.id) && slot.matches_name(&entry.subject_name))
                {
                    claimed.insert(slot.id);
                }
            }
            let mut completed = state.progress.completed_on(today);
            completed.extend(claimed);
            completed
        };

        if let Err(err) = self.backend.replace_day_progress(today, &completed).await {
            warn!(error = %err, %today, "failed to sync progress with study records");
            return Err(err.into());
        }

        {
            let mut state = self.state();
            // A slot removed while the push was in flight must not come back.
            completed.retain(|slot| state.plan.contains_slot(*slot));
            state.progress.replace_day(today, completed.clone());
        }
        info!(%today, completed = completed.len(), "synced progress with study records");
        self.persist_progress().await;
        Ok(completed)
    }

    /// Forget the plan and progress, locally and in the cache. Used on logout
    /// so the next user starts from an empty week.
    pub async fn clear(&self) {
        *self.state() = TrackerState::default();
        if let Err(err) = self.cache.clear_plan().await {
            warn!(error = %err, "failed to clear cached weekly plan");
        }
        if let Err(err) = self.cache.clear_progress().await {
            warn!(error = %err, "failed to clear cached daily progress");
        }
        debug!("cleared weekly plan and progress");
    }

    //
    // ─── CACHE ─────────────────────────────────────────────────────────────────
    //

    async fn cache_plan(&self, plan: &WeeklyPlan) {
        if let Err(err) = self.cache.save_plan(plan).await {
            warn!(error = %err, "failed to cache weekly plan");
        }
    }

    async fn persist_progress(&self) {
        let progress = self.progress();
        if let Err(err) = self.cache.save_progress(&progress).await {
            warn!(error = %err, "failed to cache daily progress");
        }
    }
}
