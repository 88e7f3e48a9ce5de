use std::sync::Arc;

use reqwest::Client;
use storage::repository::Storage;

use crate::Clock;
use crate::admin_service::AdminService;
use crate::auth::{AuthProvider, FirebaseAuth};
use crate::backend::{AdminBackend, HttpBackend, StudyBackend};
use crate::catalog_service::{CareerCatalog, SubjectCatalog};
use crate::config::{ClientConfig, FIREBASE_API_KEY_VAR};
use crate::current_user::CurrentUser;
use crate::error::{AppServicesError, ConfigError, UserError};
use crate::record_service::RecordStore;
use crate::schedule_service::ScheduleTracker;
use crate::study_session::StudySessionService;
use crate::timer_service::TimerService;
use crate::user_service::UserService;

/// Wires every app-facing service to one backend, identity provider and cache.
#[derive(Clone)]
pub struct AppServices {
    auth: Arc<dyn AuthProvider>,
    users: Arc<UserService>,
    subjects: SubjectCatalog,
    careers: Arc<CareerCatalog>,
    schedule: Arc<ScheduleTracker>,
    records: Arc<RecordStore>,
    timer: TimerService,
    sessions: Arc<StudySessionService>,
    admin: Arc<AdminService>,
}

impl AppServices {
    #[must_use]
    pub fn new(
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        backend: Arc<dyn StudyBackend>,
        admin: Arc<dyn AdminBackend>,
        storage: Storage,
    ) -> Self {
        let current = CurrentUser::new();
        let subjects = SubjectCatalog::new(Arc::clone(&backend));
        let careers = Arc::new(CareerCatalog::new(Arc::clone(&backend)));
        let users = Arc::new(UserService::new(
            clock,
            Arc::clone(&auth),
            Arc::clone(&backend),
            Arc::clone(&storage.cache),
            subjects.clone(),
            current.clone(),
        ));
        let schedule = Arc::new(ScheduleTracker::new(
            clock,
            Arc::clone(&backend),
            Arc::clone(&storage.cache),
        ));
        let records = RecordStore::new(clock, backend, subjects.clone(), current);
        let timer = TimerService::new(clock);
        let sessions = Arc::new(StudySessionService::new(timer.clone(), records.clone()));

        Self {
            auth,
            users,
            subjects,
            careers,
            schedule,
            records: Arc::new(records),
            timer,
            sessions,
            admin: Arc::new(AdminService::new(admin)),
        }
    }

    /// Build services against the REST API, Firebase and a `SQLite` cache.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` without a Firebase API key,
    /// `AppServicesError::Sqlite` if the cache cannot be opened and
    /// `AppServicesError::Http` if the HTTP client cannot be built.
    pub async fn connect(config: &ClientConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let api_key = config
            .firebase_api_key
            .clone()
            .ok_or(ConfigError::Missing(FIREBASE_API_KEY_VAR))?;
        let storage = Storage::sqlite(&config.db_url).await?;
        let client = Client::builder().timeout(config.http_timeout).build()?;

        let auth: Arc<dyn AuthProvider> = Arc::new(FirebaseAuth::new(client.clone(), api_key, clock));
        let backend = Arc::new(
            HttpBackend::with_client(client, config.api_base_url.clone(), Arc::clone(&auth))
                .with_clock(clock),
        );
        Ok(Self::new(clock, auth, backend.clone(), backend, storage))
    }

    #[must_use]
    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn users(&self) -> Arc<UserService> {
        Arc::clone(&self.users)
    }

    #[must_use]
    pub fn subjects(&self) -> SubjectCatalog {
        self.subjects.clone()
    }

    #[must_use]
    pub fn careers(&self) -> Arc<CareerCatalog> {
        Arc::clone(&self.careers)
    }

    #[must_use]
    pub fn schedule(&self) -> Arc<ScheduleTracker> {
        Arc::clone(&self.schedule)
    }

    #[must_use]
    pub fn records(&self) -> Arc<RecordStore> {
        Arc::clone(&self.records)
    }

    #[must_use]
    pub fn timer(&self) -> TimerService {
        self.timer.clone()
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<StudySessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn admin(&self) -> Arc<AdminService> {
        Arc::clone(&self.admin)
    }

    /// Sign out and drop every per-user cache.
    ///
    /// # Errors
    ///
    /// Returns `UserError` if the identity provider fails to sign out; local
    /// state is cleared regardless.
    pub async fn logout(&self) -> Result<(), UserError> {
        self.records.clear();
        self.schedule.clear().await;
        self.users.logout().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryAuth;
    use crate::backend::InMemoryBackend;
    use study_core::model::UserId;
    use study_core::time::fixed_clock;

    #[tokio::test]
    async fn connect_requires_firebase_key() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        let err = AppServices::connect(&config, fixed_clock()).await.err();
        assert!(matches!(
            err,
            Some(AppServicesError::Config(ConfigError::Missing(FIREBASE_API_KEY_VAR)))
        ));
    }

    #[tokio::test]
    async fn services_share_the_signed_in_user() {
        let clock = fixed_clock();
        let backend = Arc::new(InMemoryBackend::new(clock));
        let math = backend.add_subject("Math").id;
        let services = AppServices::new(
            clock,
            Arc::new(InMemoryAuth::signed_in("u1")),
            backend.clone(),
            backend.clone(),
            Storage::in_memory(),
        );

        services.users().initialize().await.unwrap();
        services.sessions().select(math, "Limits");
        services.sessions().start().unwrap();
        services.timer().advance(chrono::Duration::minutes(1));
        let entry = services.sessions().finish(0, 0).await.unwrap();

        assert_eq!(entry.record.user_id, UserId::new("u1"));
        assert_eq!(services.records().records(), vec![entry]);
    }
}
