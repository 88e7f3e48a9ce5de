use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use study_core::model::{
    AdminUser, AdminUserUpdate, Career, CareerId, ChartData, DailyProgress, DashboardStats,
    DayPlan, NewStudyRecord, RecordId, SlotId, StudyRecord, StudyRecordPatch, Subject,
    SubjectId, SubjectSlot, UserId, UserPage, UserProfile, WeeklyPlan,
};

use super::{AdminBackend, StudyBackend};
use crate::Clock;
use crate::error::ApiError;

/// Backend calls that can be made to fail with `fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchProfile,
    SyncRegistration,
    ListCareers,
    CreateCareer,
    SaveUserCareer,
    UserCareer,
    ListSubjects,
    CreateSubject,
    UserSubjects,
    SaveUserSubjects,
    DeactivateUserSubject,
    ListRecords,
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    FetchPlan,
    SavePlan,
    FetchProgress,
    SetCompletion,
    ReplaceDayProgress,
    Admin,
}

/// First id handed out for slots saved through the backend, so tests can
/// tell backend ids from locally assigned ones.
const FIRST_BACKEND_SLOT_ID: u64 = 1000;

struct BackendState {
    failing: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
    profiles: HashMap<UserId, UserProfile>,
    registrations: usize,
    careers: Vec<Career>,
    user_careers: HashMap<UserId, CareerId>,
    subjects: Vec<Subject>,
    user_subjects: HashMap<UserId, Vec<SubjectId>>,
    records: Vec<StudyRecord>,
    plan: WeeklyPlan,
    progress: DailyProgress,
    admin_users: Vec<AdminUser>,
    next_id: u64,
    next_slot_id: u64,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            failing: HashSet::new(),
            calls: HashMap::new(),
            profiles: HashMap::new(),
            registrations: 0,
            careers: Vec::new(),
            user_careers: HashMap::new(),
            subjects: Vec::new(),
            user_subjects: HashMap::new(),
            records: Vec::new(),
            plan: WeeklyPlan::empty(),
            progress: DailyProgress::new(),
            admin_users: Vec::new(),
            next_id: 1,
            next_slot_id: FIRST_BACKEND_SLOT_ID,
        }
    }
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn not_found() -> ApiError {
    ApiError::HttpStatus(StatusCode::NOT_FOUND)
}

/// Whole API kept in process, with per-operation failure injection.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    clock: Clock,
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and fail it if the operation was marked failing.
    fn enter(&self, op: Operation) -> Result<MutexGuard<'_, BackendState>, ApiError> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        if state.failing.contains(&op) {
            return Err(ApiError::Unavailable(format!("{op:?} is failing")));
        }
        Ok(state)
    }

    /// Make every subsequent `op` call fail until `recover` is called.
    pub fn fail(&self, op: Operation) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: Operation) {
        self.state().failing.remove(&op);
    }

    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn add_subject(&self, name: &str) -> Subject {
        let mut state = self.state();
        let subject = Subject {
            id: SubjectId::new(state.next_id()),
            name: name.to_string(),
        };
        state.subjects.push(subject.clone());
        subject
    }

    pub fn add_career(&self, name: &str) -> Career {
        let mut state = self.state();
        let career = Career {
            id: CareerId::new(state.next_id()),
            name: name.to_string(),
            icon: None,
        };
        state.careers.push(career.clone());
        career
    }

    pub fn set_profile(&self, user: &UserId, profile: UserProfile) {
        self.state().profiles.insert(user.clone(), profile);
    }

    pub fn set_plan(&self, plan: WeeklyPlan) {
        self.state().plan = plan;
    }

    pub fn set_progress(&self, progress: DailyProgress) {
        self.state().progress = progress;
    }

    pub fn insert_record(&self, record: StudyRecord) {
        self.state().records.push(record);
    }

    pub fn add_admin_user(&self, user: AdminUser) {
        self.state().admin_users.push(user);
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
    pub fn records(&self) -> Vec<StudyRecord> {
        self.state().records.clone()
    }

    #[must_use]
    pub fn registrations(&self) -> usize {
        self.state().registrations
    }

    #[must_use]
    pub fn user_subject_ids(&self, user: &UserId) -> Vec<SubjectId> {
        self.state()
            .user_subjects
            .get(user)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StudyBackend for InMemoryBackend {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ApiError> {
        let state = self.enter(Operation::FetchProfile)?;
        Ok(state.profiles.get(user).cloned().unwrap_or_default())
    }

    async fn sync_registration(&self) -> Result<(), ApiError> {
        self.enter(Operation::SyncRegistration)?.registrations += 1;
        Ok(())
    }

    async fn list_careers(&self) -> Result<Vec<Career>, ApiError> {
        Ok(self.enter(Operation::ListCareers)?.careers.clone())
    }

    async fn create_career(&self, name: &str, icon: &str) -> Result<Career, ApiError> {
        let mut state = self.enter(Operation::CreateCareer)?;
        let career = Career {
            id: CareerId::new(state.next_id()),
            name: name.to_string(),
            icon: Some(icon.to_string()),
        };
        state.careers.push(career.clone());
        Ok(career)
    }

    async fn save_user_career(&self, user: &UserId, career: CareerId) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::SaveUserCareer)?;
        if !state.careers.iter().any(|known| known.id == career) {
            return Err(not_found());
        }
        state.user_careers.insert(user.clone(), career);
        Ok(())
    }

    async fn user_career(&self, user: &UserId) -> Result<Option<CareerId>, ApiError> {
        let state = self.enter(Operation::UserCareer)?;
        Ok(state.user_careers.get(user).copied())
    }

    async fn user_career_name(&self, user: &UserId) -> Result<Option<String>, ApiError> {
        let state = self.enter(Operation::UserCareer)?;
        Ok(state.user_careers.get(user).and_then(|id| {
            state
                .careers
                .iter()
                .find(|career| career.id == *id)
                .map(|career| career.name.clone())
        }))
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, ApiError> {
        Ok(self.enter(Operation::ListSubjects)?.subjects.clone())
    }

    async fn create_subject(&self, name: &str) -> Result<Subject, ApiError> {
        let mut state = self.enter(Operation::CreateSubject)?;
        let subject = Subject {
            id: SubjectId::new(state.next_id()),
            name: name.to_string(),
        };
        state.subjects.push(subject.clone());
        Ok(subject)
    }

    async fn user_subjects(&self, user: &UserId) -> Result<Vec<SubjectId>, ApiError> {
        let state = self.enter(Operation::UserSubjects)?;
        // Mirrors the API: a user who never picked subjects gets a 404.
        state.user_subjects.get(user).cloned().ok_or_else(not_found)
    }

    async fn save_user_subjects(
        &self,
        user: &UserId,
        selected: &[SubjectId],
        deactivate: &[SubjectId],
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::SaveUserSubjects)?;
        let current = state.user_subjects.entry(user.clone()).or_default();
        current.retain(|id| !deactivate.contains(id));
        for id in selected {
            if !current.contains(id) {
                current.push(*id);
            }
        }
        Ok(())
    }

    async fn deactivate_user_subject(
        &self,
        user: &UserId,
        subject: SubjectId,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::DeactivateUserSubject)?;
        let current = state.user_subjects.get_mut(user).ok_or_else(not_found)?;
        current.retain(|id| *id != subject);
        Ok(())
    }

    async fn list_records(&self, user: &UserId) -> Result<Vec<StudyRecord>, ApiError> {
        let state = self.enter(Operation::ListRecords)?;
        Ok(state
            .records
            .iter()
            .filter(|record| record.user_id == *user)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        user: &UserId,
        record: &NewStudyRecord,
    ) -> Result<StudyRecord, ApiError> {
        let mut state = self.enter(Operation::CreateRecord)?;
        let created = StudyRecord {
            id: RecordId::new(state.next_id()),
            user_id: user.clone(),
            subject_id: record.subject_id,
            topic: record.topic.clone(),
            study_time_secs: record.study_time_secs,
            total_pauses: record.total_pauses,
            questions_resolved: record.questions_resolved,
            correct_answers: record.correct_answers,
            incorrect_answers: record.incorrect_answers,
            created_at: self.clock.now(),
            active: true,
        };
        state.records.push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        _user: &UserId,
        id: RecordId,
        patch: &StudyRecordPatch,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::UpdateRecord)?;
        let record = state
            .records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(not_found)?;
        record.apply_patch(patch);
        Ok(())
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::DeleteRecord)?;
        let before = state.records.len();
        state.records.retain(|record| record.id != id);
        if state.records.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn fetch_plan(&self) -> Result<WeeklyPlan, ApiError> {
        Ok(self.enter(Operation::FetchPlan)?.plan.clone())
    }

    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<WeeklyPlan, ApiError> {
        let mut state = self.enter(Operation::SavePlan)?;
        // Every save re-issues slot ids, as a backend replacing rows would.
        let mut days = Vec::with_capacity(plan.days().len());
        for entry in plan.days() {
            let mut subjects = Vec::with_capacity(entry.subjects.len());
            for slot in &entry.subjects {
                let id = SlotId::new(state.next_slot_id);
                state.next_slot_id += 1;
                subjects.push(SubjectSlot::new(id, slot.subject_id, slot.name.clone()));
            }
            days.push(DayPlan {
                day: entry.day,
                subjects,
            });
        }
        let canonical = WeeklyPlan::from_days(days)
            .map_err(|err| ApiError::Unavailable(format!("rejected plan: {err}")))?;

        let mapping = state.plan.id_mapping_to(&canonical);
        state.progress.remap(&mapping);
        state.plan = canonical.clone();
        Ok(canonical)
    }

    async fn fetch_progress(&self) -> Result<DailyProgress, ApiError> {
        Ok(self.enter(Operation::FetchProgress)?.progress.clone())
    }

    async fn set_completion(
        &self,
        date: NaiveDate,
        slot: SlotId,
        completed: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::SetCompletion)?;
        state.progress.set_completed(date, slot, completed);
        Ok(())
    }

    async fn replace_day_progress(
        &self,
        date: NaiveDate,
        slots: &BTreeSet<SlotId>,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::ReplaceDayProgress)?;
        state.progress.replace_day(date, slots.clone());
        Ok(())
    }
}

#[async_trait]
impl AdminBackend for InMemoryBackend {
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        let state = self.enter(Operation::Admin)?;
        let study_secs: u64 = state
            .records
            .iter()
            .map(|record| u64::from(record.study_time_secs))
            .sum();
        Ok(DashboardStats {
            total_users: state.admin_users.len() as u64,
            latest_registration_date: None,
            total_careers: state.careers.len() as u64,
            total_subjects: state.subjects.len() as u64,
            total_hours_study: study_secs as f64 / 3600.0,
        })
    }

    async fn study_session_chart(&self) -> Result<ChartData, ApiError> {
        drop(self.enter(Operation::Admin)?);
        Ok(ChartData::default())
    }

    async fn career_distribution_chart(&self) -> Result<ChartData, ApiError> {
        drop(self.enter(Operation::Admin)?);
        Ok(ChartData::default())
    }

    async fn list_users(&self, page: u32) -> Result<UserPage, ApiError> {
        const PER_PAGE: usize = 10;
        let state = self.enter(Operation::Admin)?;
        let page = page.max(1);
        let total = state.admin_users.len();
        let last_page = u32::try_from(total.div_ceil(PER_PAGE).max(1)).unwrap_or(u32::MAX);
        let start = (page as usize - 1) * PER_PAGE;
        Ok(UserPage {
            users: state
                .admin_users
                .iter()
                .skip(start)
                .take(PER_PAGE)
                .cloned()
                .collect(),
            current_page: page,
            last_page,
            total: total as u64,
        })
    }

    async fn fetch_user(&self, id: u64) -> Result<AdminUser, ApiError> {
        let state = self.enter(Operation::Admin)?;
        state
            .admin_users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn update_user(&self, id: u64, update: &AdminUserUpdate) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::Admin)?;
        let user = state
            .admin_users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(not_found)?;
        if let Some(name) = &update.name {
            user.name = Some(name.clone());
        }
        if let Some(email) = &update.email {
            user.email = Some(email.clone());
        }
        if let Some(is_premium) = update.is_premium {
            user.is_premium = is_premium;
        }
        if update.premium_expires_at.is_some() {
            user.premium_expires_at = update.premium_expires_at;
        }
        Ok(())
    }

    async fn delete_user(&self, id: u64) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::Admin)?;
        let before = state.admin_users.len();
        state.admin_users.retain(|user| user.id != id);
        if state.admin_users.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}
