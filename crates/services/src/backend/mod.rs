//! The REST backend behind trait objects.
//!
//! `HttpBackend` talks to the real API; `InMemoryBackend` keeps everything in
//! process for tests and offline prototyping.

mod http;
mod memory;
mod wire;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use study_core::model::{
    AdminUser, AdminUserUpdate, Career, CareerId, ChartData, DailyProgress, DashboardStats,
    NewStudyRecord, RecordId, SlotId, StudyRecord, StudyRecordPatch, Subject, SubjectId, UserId,
    UserPage, UserProfile, WeeklyPlan,
};

use crate::error::ApiError;

pub use http::HttpBackend;
pub use memory::{InMemoryBackend, Operation};

/// Everything a signed-in student does against the API.
#[async_trait]
pub trait StudyBackend: Send + Sync {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ApiError>;

    /// Tell the backend a new identity exists so it can create its user row.
    async fn sync_registration(&self) -> Result<(), ApiError>;

    async fn list_careers(&self) -> Result<Vec<Career>, ApiError>;
    async fn create_career(&self, name: &str, icon: &str) -> Result<Career, ApiError>;
    async fn save_user_career(&self, user: &UserId, career: CareerId) -> Result<(), ApiError>;
    /// A 404 means the user has not picked a career yet.
    async fn user_career(&self, user: &UserId) -> Result<Option<CareerId>, ApiError>;
    async fn user_career_name(&self, user: &UserId) -> Result<Option<String>, ApiError>;

    async fn list_subjects(&self) -> Result<Vec<Subject>, ApiError>;
    async fn create_subject(&self, name: &str) -> Result<Subject, ApiError>;
    async fn user_subjects(&self, user: &UserId) -> Result<Vec<SubjectId>, ApiError>;
    /// Activate `selected` and deactivate `deactivate` in one call.
    async fn save_user_subjects(
        &self,
        user: &UserId,
        selected: &[SubjectId],
        deactivate: &[SubjectId],
    ) -> Result<(), ApiError>;
    async fn deactivate_user_subject(
        &self,
        user: &UserId,
        subject: SubjectId,
    ) -> Result<(), ApiError>;

    async fn list_records(&self, user: &UserId) -> Result<Vec<StudyRecord>, ApiError>;
    async fn create_record(
        &self,
        user: &UserId,
        record: &NewStudyRecord,
    ) -> Result<StudyRecord, ApiError>;
    async fn update_record(
        &self,
        user: &UserId,
        id: RecordId,
        patch: &StudyRecordPatch,
    ) -> Result<(), ApiError>;
    async fn delete_record(&self, id: RecordId) -> Result<(), ApiError>;

    async fn fetch_plan(&self) -> Result<WeeklyPlan, ApiError>;
    /// Replace the stored plan; returns the canonical plan with backend ids.
    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<WeeklyPlan, ApiError>;
    async fn fetch_progress(&self) -> Result<DailyProgress, ApiError>;
    async fn set_completion(
        &self,
        date: NaiveDate,
        slot: SlotId,
        completed: bool,
    ) -> Result<(), ApiError>;
    /// Overwrite the completed set of one day.
    async fn replace_day_progress(
        &self,
        date: NaiveDate,
        slots: &BTreeSet<SlotId>,
    ) -> Result<(), ApiError>;
}

/// Administrative endpoints, reachable only with an admin account.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError>;
    async fn study_session_chart(&self) -> Result<ChartData, ApiError>;
    async fn career_distribution_chart(&self) -> Result<ChartData, ApiError>;
    async fn list_users(&self, page: u32) -> Result<UserPage, ApiError>;
    async fn fetch_user(&self, id: u64) -> Result<AdminUser, ApiError>;
    async fn update_user(&self, id: u64, update: &AdminUserUpdate) -> Result<(), ApiError>;
    async fn delete_user(&self, id: u64) -> Result<(), ApiError>;
}
