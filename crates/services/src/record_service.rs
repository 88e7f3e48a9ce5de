use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use study_core::model::{
    NewStudyRecordDraft, RecordEntry, RecordId, RecordStats, StudyRecord, StudyRecordPatch,
    UNKNOWN_SUBJECT, UserId,
};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::backend::StudyBackend;
use crate::catalog_service::SubjectCatalog;
use crate::current_user::CurrentUser;
use crate::error::RecordStoreError;

#[derive(Default)]
struct RecordState {
    entries: Vec<RecordEntry>,
    loaded: bool,
}

/// The signed-in user's study history.
///
/// Mutations go to the backend first and are then mirrored into the local
/// list, so the history never needs a full refetch after an edit.
#[derive(Clone)]
pub struct RecordStore {
    clock: Clock,
    backend: Arc<dyn StudyBackend>,
    subjects: SubjectCatalog,
    user: CurrentUser,
    state: Arc<Mutex<RecordState>>,
}

impl RecordStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        backend: Arc<dyn StudyBackend>,
        subjects: SubjectCatalog,
        user: CurrentUser,
    ) -> Self {
        Self {
            clock,
            backend,
            subjects,
            user,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_id(&self) -> Result<UserId, RecordStoreError> {
        self.user.get().ok_or(RecordStoreError::NoUser)
    }

    /// Subject names are cosmetic; records still load without them.
    async fn ensure_subjects(&self) {
        if self.subjects.is_empty() {
            if let Err(err) = self.subjects.fetch(false).await {
                debug!(error = %err, "loading records without subject names");
            }
        }
    }

    fn entry_for(&self, record: StudyRecord) -> RecordEntry {
        let subject_name = self
            .subjects
            .name_of(record.subject_id)
            .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
        RecordEntry {
            record,
            subject_name,
        }
    }

    /// Load the user's active records unless already loaded.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError::NoUser` before sign-in and
    /// `RecordStoreError::Api` if the backend call fails; the list is kept.
    pub async fn fetch(&self, force: bool) -> Result<(), RecordStoreError> {
        if !force && self.state().loaded {
            return Ok(());
        }
        let user = self.user_id()?;
        self.ensure_subjects().await;

        let records = self
            .backend
            .list_records(&user)
            .await
            .inspect_err(|err| warn!(error = %err, "failed to fetch study records"))?;
        let entries: Vec<RecordEntry> = records
            .into_iter()
            .filter(|record| record.active)
            .map(|record| self.entry_for(record))
            .collect();

        let mut state = self.state();
        state.entries = entries;
        state.loaded = true;
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> Vec<RecordEntry> {
        self.state().entries.clone()
    }

    #[must_use]
    pub fn find(&self, id: RecordId) -> Option<RecordEntry> {
        self.state()
            .entries
            .iter()
            .find(|entry| entry.record.id == id)
            .cloned()
    }

    /// Records logged on the clock's current local day.
    #[must_use]
    pub fn today(&self) -> Vec<RecordEntry> {
        let today = self.clock.today();
        self.state()
            .entries
            .iter()
            .filter(|entry| entry.record.local_date() == today)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> RecordStats {
        let state = self.state();
        RecordStats::from_records(state.entries.iter().map(|entry| &entry.record))
    }

    /// Validate and log a study session.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError::Record` for invalid input (nothing is sent),
    /// `RecordStoreError::NoUser` before sign-in and `RecordStoreError::Api`
    /// if the backend rejects it.
    pub async fn create(&self, draft: NewStudyRecordDraft) -> Result<RecordEntry, RecordStoreError> {
        let record = draft.validate()?;
        let user = self.user_id()?;
        let created = self
            .backend
            .create_record(&user, &record)
            .await
            .inspect_err(|err| warn!(error = %err, "failed to create study record"))?;
        info!(
            id = %created.id,
            subject = %created.subject_id,
            secs = created.study_time_secs,
            "logged study session"
        );

        self.ensure_subjects().await;
        let entry = self.entry_for(created);
        self.state().entries.push(entry.clone());
        Ok(entry)
    }

    /// # Errors
    ///
    /// Returns `RecordStoreError::Record` if the answer counts do not add up,
    /// `RecordStoreError::NoUser` before sign-in and `RecordStoreError::Api`
    /// if the backend rejects it; the local entry is unchanged on error.
    pub async fn update(&self, id: RecordId, patch: StudyRecordPatch) -> Result<(), RecordStoreError> {
        patch.validate()?;
        let user = self.user_id()?;
        self.backend
            .update_record(&user, id, &patch)
            .await
            .inspect_err(|err| warn!(error = %err, %id, "failed to update study record"))?;

        let subject_name = self.subjects.name_of(patch.subject_id);
        let mut state = self.state();
        if let Some(entry) = state.entries.iter_mut().find(|entry| entry.record.id == id) {
            entry.record.apply_patch(&patch);
            entry.subject_name = subject_name.unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RecordStoreError::Api` if the backend refuses; the local list
    /// is unchanged on error.
    pub async fn delete(&self, id: RecordId) -> Result<(), RecordStoreError> {
        self.backend
            .delete_record(id)
            .await
            .inspect_err(|err| warn!(error = %err, %id, "failed to delete study record"))?;
        self.state().entries.retain(|entry| entry.record.id != id);
        info!(%id, "deleted study record");
        Ok(())
    }

    /// Forget everything, e.g. on sign-out.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, Operation};
    use study_core::model::{StudyTime, SubjectId};
    use study_core::time::fixed_clock;

    struct Harness {
        backend: InMemoryBackend,
        user: CurrentUser,
        store: RecordStore,
        math: SubjectId,
    }

    fn harness() -> Harness {
        let clock = fixed_clock();
        let backend = InMemoryBackend::new(clock);
        let math = backend.add_subject("Math").id;
        let shared: Arc<dyn StudyBackend> = Arc::new(backend.clone());
        let user = CurrentUser::new();
        user.set(UserId::new("u1"));
        let store = RecordStore::new(
            clock,
            Arc::clone(&shared),
            SubjectCatalog::new(shared),
            user.clone(),
        );
        Harness {
            backend,
            user,
            store,
            math,
        }
    }

    fn draft(subject: SubjectId, secs: u32) -> NewStudyRecordDraft {
        NewStudyRecordDraft {
            subject_id: subject,
            topic: "Fractions".into(),
            study_time: StudyTime::Seconds(secs),
            total_pauses: 1,
            questions_resolved: 10,
            incorrect_answers: 4,
        }
    }

    #[tokio::test]
    async fn create_appends_denormalized_entry() {
        let h = harness();
        let entry = h.store.create(draft(h.math, 1200)).await.unwrap();
        assert_eq!(entry.subject_name, "Math");
        assert_eq!(entry.record.correct_answers, 6);
        assert_eq!(h.store.records(), vec![entry.clone()]);
        assert_eq!(h.store.today(), vec![entry]);

        let orphan = h.store.create(draft(SubjectId::new(99), 60)).await.unwrap();
        assert_eq!(orphan.subject_name, UNKNOWN_SUBJECT);
    }

    #[tokio::test]
    async fn invalid_drafts_never_reach_the_backend() {
        let h = harness();
        let err = h.store.create(draft(h.math, 0)).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::Record(_)));
        assert_eq!(h.backend.calls(Operation::CreateRecord), 0);
    }

    #[tokio::test]
    async fn delete_removes_exactly_that_id() {
        let h = harness();
        let first = h.store.create(draft(h.math, 600)).await.unwrap();
        let second = h.store.create(draft(h.math, 900)).await.unwrap();

        h.store.delete(first.record.id).await.unwrap();
        assert_eq!(h.store.records(), vec![second]);
    }

    #[tokio::test]
    async fn failed_delete_keeps_local_list() {
        let h = harness();
        let entry = h.store.create(draft(h.math, 600)).await.unwrap();
        h.backend.fail(Operation::DeleteRecord);
        assert!(h.store.delete(entry.record.id).await.is_err());
        assert_eq!(h.store.records().len(), 1);
    }

    #[tokio::test]
    async fn fetch_is_cached_and_skips_inactive_records() {
        let h = harness();
        let kept = h.store.create(draft(h.math, 600)).await.unwrap();
        let mut hidden = kept.record.clone();
        hidden.id = RecordId::new(500);
        hidden.active = false;
        h.backend.insert_record(hidden);

        h.store.clear();
        h.store.fetch(false).await.unwrap();
        h.store.fetch(false).await.unwrap();
        assert_eq!(h.backend.calls(Operation::ListRecords), 1);
        assert_eq!(h.store.records(), vec![kept]);

        h.store.fetch(true).await.unwrap();
        assert_eq!(h.backend.calls(Operation::ListRecords), 2);
    }

    #[tokio::test]
    async fn records_load_without_subject_names() {
        let h = harness();
        h.backend.fail(Operation::ListSubjects);
        h.backend.insert_record(StudyRecord {
            id: RecordId::new(7),
            user_id: UserId::new("u1"),
            subject_id: h.math,
            topic: String::new(),
            study_time_secs: 300,
            total_pauses: 0,
            questions_resolved: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            created_at: fixed_clock().now(),
            active: true,
        });

        h.store.fetch(false).await.unwrap();
        let records = h.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject_name, UNKNOWN_SUBJECT);
        assert_eq!(h.backend.calls(Operation::ListSubjects), 1);
    }

    #[tokio::test]
    async fn update_merges_patch_locally() {
        let h = harness();
        let entry = h.store.create(draft(h.math, 600)).await.unwrap();
        let mut patch = StudyRecordPatch::from_record(&entry.record);
        patch.topic = "Ratios".into();
        patch.correct_answers = 9;
        patch.incorrect_answers = 1;

        h.store.update(entry.record.id, patch).await.unwrap();
        let updated = h.store.find(entry.record.id).unwrap();
        assert_eq!(updated.record.topic, "Ratios");
        assert_eq!(h.backend.records()[0].correct_answers, 9);
        assert!((h.store.stats().correct_percentage() - 90.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn requires_a_user() {
        let h = harness();
        h.user.clear();
        assert!(matches!(
            h.store.fetch(false).await,
            Err(RecordStoreError::NoUser)
        ));
        assert!(matches!(
            h.store.create(draft(h.math, 60)).await,
            Err(RecordStoreError::NoUser)
        ));
    }
}
