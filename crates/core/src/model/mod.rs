mod admin;
mod catalog;
mod cycle;
pub mod de;
mod ids;
mod plan;
mod progress;
mod record;
mod user;

pub use ids::{CareerId, ParseIdError, RecordId, SlotId, SubjectId, UserId};

pub use admin::{AdminUser, AdminUserUpdate, ChartData, ChartDataset, DashboardStats, UserPage};
pub use catalog::{Career, DEFAULT_CAREER_ICON, Subject, subject_name};
pub use cycle::{CycleError, CycleSummary, StudyCycle, StudyCycles};
pub use plan::{DayOfWeek, DayPlan, PlanError, SubjectSlot, WeeklyPlan};
pub use progress::{DailyProgress, ProgressToggle};
pub use record::{
    NewStudyRecord, NewStudyRecordDraft, RecordEntry, RecordError, RecordStats, StudyRecord,
    StudyRecordPatch, StudyTime, UNKNOWN_SUBJECT,
};
pub use user::UserProfile;
