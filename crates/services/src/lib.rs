#![forbid(unsafe_code)]

pub mod admin_service;
pub mod app_services;
pub mod auth;
pub mod backend;
pub mod catalog_service;
pub mod config;
pub mod current_user;
pub mod error;
pub mod record_service;
pub mod schedule_service;
pub mod study_session;
pub mod timer_service;
pub mod user_service;

pub use study_core::Clock;

pub use admin_service::AdminService;
pub use app_services::AppServices;
pub use auth::{AuthProvider, AuthUser, FirebaseAuth, FirebaseEndpoints, InMemoryAuth};
pub use backend::{AdminBackend, HttpBackend, InMemoryBackend, Operation, StudyBackend};
pub use catalog_service::{CareerCatalog, SubjectCatalog};
pub use config::ClientConfig;
pub use current_user::CurrentUser;
pub use error::{
    ApiError, AppServicesError, AuthError, CatalogError, ConfigError, RecordStoreError,
    ScheduleError, SessionError, UserError,
};
pub use record_service::RecordStore;
pub use schedule_service::{PlanSource, ScheduleTracker, SlotStatus};
pub use study_session::{SessionSelection, StudySessionService};
pub use timer_service::TimerService;
pub use user_service::{CareerChoice, UserService};
