use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use study_core::model::{NewStudyRecordDraft, RecordEntry, StudyTime, SubjectId};
use study_core::timer::{TimerSnapshot, TimerStatus, TimerSummary};
use tracing::{info, warn};

use crate::error::SessionError;
use crate::record_service::RecordStore;
use crate::timer_service::TimerService;

/// What the user is about to study.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSelection {
    pub subject: Option<SubjectId>,
    pub topic: String,
}

fn draft(
    subject: SubjectId,
    topic: &str,
    elapsed_secs: u64,
    pauses: usize,
    questions: u32,
    incorrect: u32,
) -> NewStudyRecordDraft {
    NewStudyRecordDraft {
        subject_id: subject,
        topic: topic.to_string(),
        study_time: StudyTime::Seconds(u32::try_from(elapsed_secs).unwrap_or(u32::MAX)),
        total_pauses: u32::try_from(pauses).unwrap_or(u32::MAX),
        questions_resolved: questions,
        incorrect_answers: incorrect,
    }
}

/// Timed study: pick a subject, run the timer, log the result.
#[derive(Clone)]
pub struct StudySessionService {
    timer: TimerService,
    records: RecordStore,
    selection: Arc<Mutex<SessionSelection>>,
}

impl StudySessionService {
    #[must_use]
    pub fn new(timer: TimerService, records: RecordStore) -> Self {
        Self {
            timer,
            records,
            selection: Arc::default(),
        }
    }

    fn selection_mut(&self) -> MutexGuard<'_, SessionSelection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn select(&self, subject: SubjectId, topic: &str) {
        *self.selection_mut() = SessionSelection {
            subject: Some(subject),
            topic: topic.trim().to_string(),
        };
    }

    #[must_use]
    pub fn selection(&self) -> SessionSelection {
        self.selection_mut().clone()
    }

    #[must_use]
    pub fn timer(&self) -> &TimerService {
        &self.timer
    }

    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }

    /// # Errors
    ///
    /// Returns `SessionError::NoSubject` until a subject is selected.
    pub fn start(&self) -> Result<bool, SessionError> {
        if self.selection_mut().subject.is_none() {
            return Err(SessionError::NoSubject);
        }
        Ok(self.timer.start())
    }

    pub fn toggle_pause(&self) -> TimerStatus {
        self.timer.toggle_pause()
    }

    /// Stop the timer and log the session with the answered question counts.
    ///
    /// The counts are checked against the running timer first, so a typo does
    /// not cost the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSubject` without a selection,
    /// `SessionError::Record` for invalid counts or an empty session (the
    /// timer keeps running) and `SessionError::Store` if the record cannot be
    /// saved (the timer has already been reset).
    pub async fn finish(&self, questions: u32, incorrect: u32) -> Result<RecordEntry, SessionError> {
        let selection = self.selection();
        let subject = selection.subject.ok_or(SessionError::NoSubject)?;

        let snapshot = self.timer.snapshot();
        draft(
            subject,
            &selection.topic,
            snapshot.elapsed_secs,
            snapshot.pause_secs.len(),
            questions,
            incorrect,
        )
        .validate()?;

        let TimerSummary {
            elapsed_secs,
            pause_count,
            ..
        } = self.timer.stop();
        let record = draft(
            subject,
            &selection.topic,
            elapsed_secs,
            pause_count as usize,
            questions,
            incorrect,
        );
        let entry = self.records.create(record).await.inspect_err(|err| {
            warn!(error = %err, elapsed_secs, "study session could not be saved");
        })?;
        info!(id = %entry.record.id, subject = %entry.subject_name, "study session finished");
        Ok(entry)
    }

    /// Throw the running session away.
    pub fn discard(&self) -> TimerSummary {
        let summary = self.timer.stop();
        info!(elapsed_secs = summary.elapsed_secs, "study session discarded");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, Operation, StudyBackend};
    use crate::catalog_service::SubjectCatalog;
    use crate::current_user::CurrentUser;
    use crate::error::RecordStoreError;
    use chrono::Duration;
    use study_core::model::{RecordError, UserId};
    use study_core::time::fixed_clock;

    struct Harness {
        backend: InMemoryBackend,
        session: StudySessionService,
        math: SubjectId,
    }

    fn harness() -> Harness {
        let clock = fixed_clock();
        let backend = InMemoryBackend::new(clock);
        let math = backend.add_subject("Math").id;
        let shared: Arc<dyn StudyBackend> = Arc::new(backend.clone());
        let user = CurrentUser::new();
        user.set(UserId::new("u1"));
        let records = RecordStore::new(clock, Arc::clone(&shared), SubjectCatalog::new(shared), user);
        let session = StudySessionService::new(TimerService::new(clock), records);
        Harness {
            backend,
            session,
            math,
        }
    }

    #[test]
    fn start_requires_a_subject() {
        let h = harness();
        assert!(matches!(h.session.start(), Err(SessionError::NoSubject)));
        h.session.select(h.math, " Algebra ");
        assert!(h.session.start().unwrap());
        assert_eq!(h.session.selection().topic, "Algebra");
    }

    #[tokio::test]
    async fn finish_logs_timer_totals() {
        let h = harness();
        h.session.select(h.math, "Algebra");
        h.session.start().unwrap();
        h.session.timer().advance(Duration::minutes(25));
        h.session.toggle_pause();
        h.session.timer().advance(Duration::minutes(5));
        h.session.toggle_pause();
        h.session.timer().advance(Duration::minutes(5));

        let entry = h.session.finish(20, 5).await.unwrap();
        assert_eq!(entry.subject_name, "Math");
        assert_eq!(entry.record.study_time_secs, 30 * 60);
        assert_eq!(entry.record.total_pauses, 1);
        assert_eq!(entry.record.correct_answers, 15);
        assert!(!h.session.snapshot().is_running());
        assert_eq!(h.backend.records().len(), 1);
    }

    #[tokio::test]
    async fn bad_counts_keep_the_timer_running() {
        let h = harness();
        h.session.select(h.math, "Algebra");
        h.session.start().unwrap();
        h.session.timer().advance(Duration::minutes(10));

        let err = h.session.finish(3, 4).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Record(RecordError::TooManyIncorrect { .. })
        ));
        assert!(h.session.snapshot().is_running());
        assert_eq!(h.backend.calls(Operation::CreateRecord), 0);
    }

    #[tokio::test]
    async fn failed_save_is_reported() {
        let h = harness();
        h.session.select(h.math, "Algebra");
        h.session.start().unwrap();
        h.session.timer().advance(Duration::minutes(10));
        h.backend.fail(Operation::CreateRecord);

        let err = h.session.finish(0, 0).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(RecordStoreError::Api(_))));
    }
}
