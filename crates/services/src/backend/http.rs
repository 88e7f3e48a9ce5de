use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use study_core::model::{
    AdminUser, AdminUserUpdate, Career, CareerId, ChartData, DailyProgress, DashboardStats,
    NewStudyRecord, RecordId, SlotId, StudyRecord, StudyRecordPatch, Subject, SubjectId, UserId,
    UserPage, UserProfile, WeeklyPlan,
};
use tracing::debug;
use url::Url;

use super::wire::{
    CareerNameWire, DayProgressWire, DeactivateSubjectWire, Envelope, NewCareerWire,
    NewSubjectWire, ProfileWire, RecordBodyWire, RecordCreatedWire, RecordWire, SaveCareerWire,
    SaveUserSubjectsWire, ToggleWire, UserCareerWire, UserPageWire, UserSubjectWire,
    parse_timestamp,
};
use super::{AdminBackend, StudyBackend};
use crate::Clock;
use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::error::ApiError;

/// `StudyBackend` over the REST API.
///
/// Every request carries `Authorization: Bearer <id token>` while a user is
/// signed in; anonymous requests go out without the header.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    auth: Arc<dyn AuthProvider>,
    clock: Clock,
}

impl HttpBackend {
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self::with_client(client, config.api_base_url.clone(), auth))
    }

    /// `base_url` should end with `/`; routes are joined underneath it.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client,
            base_url,
            auth,
            clock: Clock::default_clock(),
        }
    }

    /// Clock used to stamp records the backend returns without `created_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::InvalidPath(format!("{path}: {err}")))?;
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.auth.id_token().await? {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url = %response.url(), %status, "backend request failed");
            return Err(ApiError::HttpStatus(status));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let builder = self.request(Method::GET, path).await?;
        Self::decode(Self::send(builder).await?).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(method, path).await?.json(body);
        Self::decode(Self::send(builder).await?).await
    }

    /// Send a mutation whose response body carries nothing we need.
    async fn execute<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut builder = self.request(method, path).await?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Self::send(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl StudyBackend for HttpBackend {
    async fn fetch_profile(&self, user: &UserId) -> Result<UserProfile, ApiError> {
        let wire: Envelope<ProfileWire> = self.get(&format!("user/{user}")).await?;
        Ok(wire.into_inner().into())
    }

    async fn sync_registration(&self) -> Result<(), ApiError> {
        self.execute::<()>(Method::POST, "users/sync-on-register", None)
            .await
    }

    async fn list_careers(&self) -> Result<Vec<Career>, ApiError> {
        let careers: Envelope<Vec<Career>> = self.get("careers").await?;
        Ok(careers.into_inner())
    }

    async fn create_career(&self, name: &str, icon: &str) -> Result<Career, ApiError> {
        let created: Envelope<Career> = self
            .send_json(Method::POST, "careers", &NewCareerWire { name, icon })
            .await?;
        Ok(created.into_inner())
    }

    async fn save_user_career(&self, user: &UserId, career: CareerId) -> Result<(), ApiError> {
        let body = SaveCareerWire {
            user_id: user.as_str(),
            career_id: career,
        };
        self.execute(Method::POST, "user-career", Some(&body)).await
    }

    async fn user_career(&self, user: &UserId) -> Result<Option<CareerId>, ApiError> {
        match self.get::<UserCareerWire>(&format!("user-career/{user}")).await {
            Ok(wire) => Ok(wire.career_id),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn user_career_name(&self, user: &UserId) -> Result<Option<String>, ApiError> {
        match self
            .get::<CareerNameWire>(&format!("user-career/career_name/{user}"))
            .await
        {
            Ok(wire) => Ok(wire.career_name),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, ApiError> {
        let subjects: Envelope<Vec<Subject>> = self.get("subjects").await?;
        Ok(subjects.into_inner())
    }

    async fn create_subject(&self, name: &str) -> Result<Subject, ApiError> {
        let created: Envelope<Subject> = self
            .send_json(Method::POST, "subjects", &NewSubjectWire { name })
            .await?;
        Ok(created.into_inner())
    }

    async fn user_subjects(&self, user: &UserId) -> Result<Vec<SubjectId>, ApiError> {
        let rows: Envelope<Vec<UserSubjectWire>> = self.get(&format!("user-subjects/{user}")).await?;
        Ok(rows
            .into_inner()
            .into_iter()
            .filter(|row| row.active)
            .map(|row| row.subject_id)
            .collect())
    }

    async fn save_user_subjects(
        &self,
        user: &UserId,
        selected: &[SubjectId],
        deactivate: &[SubjectId],
    ) -> Result<(), ApiError> {
        let body = SaveUserSubjectsWire {
            user_id: user.as_str(),
            subject_ids: selected,
            subjects_to_deactivate: deactivate,
        };
        self.execute(Method::POST, "user-subjects", Some(&body))
            .await
    }

    async fn deactivate_user_subject(
        &self,
        user: &UserId,
        subject: SubjectId,
    ) -> Result<(), ApiError> {
        let body = DeactivateSubjectWire {
            user_id: user.as_str(),
            subject_id: subject,
        };
        self.execute(Method::PATCH, "user-subjects/deactivate", Some(&body))
            .await
    }

    async fn list_records(&self, user: &UserId) -> Result<Vec<StudyRecord>, ApiError> {
        let rows: Envelope<Vec<RecordWire>> = self
            .get(&format!("user-study-records/user/{user}"))
            .await?;
        let now = self.clock.now();
        Ok(rows
            .into_inner()
            .into_iter()
            .map(|row| row.into_record(now))
            .collect())
    }

    async fn create_record(
        &self,
        user: &UserId,
        record: &NewStudyRecord,
    ) -> Result<StudyRecord, ApiError> {
        let body = RecordBodyWire::create(user, record);
        let created: Envelope<RecordCreatedWire> = self
            .send_json(Method::POST, "user-study-records", &body)
            .await?;
        let created = created.into_inner();
        Ok(StudyRecord {
            id: created.id,
            user_id: user.clone(),
            subject_id: record.subject_id,
            topic: record.topic.clone(),
            study_time_secs: record.study_time_secs,
            total_pauses: record.total_pauses,
            questions_resolved: record.questions_resolved,
            correct_answers: record.correct_answers,
            incorrect_answers: record.incorrect_answers,
            created_at: created
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(|| self.clock.now()),
            active: true,
        })
    }

    async fn update_record(
        &self,
        user: &UserId,
        id: RecordId,
        patch: &StudyRecordPatch,
    ) -> Result<(), ApiError> {
        let body = RecordBodyWire::patch(user, patch);
        self.execute(Method::PUT, &format!("user-study-records/{id}"), Some(&body))
            .await
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), ApiError> {
        self.execute::<()>(Method::DELETE, &format!("user-study-records/{id}"), None)
            .await
    }

    async fn fetch_plan(&self) -> Result<WeeklyPlan, ApiError> {
        self.get("schedule").await
    }

    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<WeeklyPlan, ApiError> {
        self.send_json(Method::PUT, "schedule", plan).await
    }

    async fn fetch_progress(&self) -> Result<DailyProgress, ApiError> {
        self.get("progress").await
    }

    async fn set_completion(
        &self,
        date: NaiveDate,
        slot: SlotId,
        completed: bool,
    ) -> Result<(), ApiError> {
        let body = ToggleWire {
            date,
            slot_id: slot,
            completed,
        };
        self.execute(Method::POST, "progress/toggle", Some(&body))
            .await
    }

    async fn replace_day_progress(
        &self,
        date: NaiveDate,
        slots: &BTreeSet<SlotId>,
    ) -> Result<(), ApiError> {
        let body = DayProgressWire { slot_ids: slots };
        self.execute(Method::PUT, &format!("progress/{date}"), Some(&body))
            .await
    }
}

#[async_trait]
impl AdminBackend for HttpBackend {
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.get("admin/stats").await
    }

    async fn study_session_chart(&self) -> Result<ChartData, ApiError> {
        self.get("admin/charts/study-sessions").await
    }

    async fn career_distribution_chart(&self) -> Result<ChartData, ApiError> {
        self.get("admin/charts/career-distribution").await
    }

    async fn list_users(&self, page: u32) -> Result<UserPage, ApiError> {
        let builder = self
            .request(Method::GET, "users")
            .await?
            .query(&[("page", page)]);
        let wire: UserPageWire = Self::decode(Self::send(builder).await?).await?;
        Ok(wire.into())
    }

    async fn fetch_user(&self, id: u64) -> Result<AdminUser, ApiError> {
        let user: Envelope<AdminUser> = self.get(&format!("users/{id}")).await?;
        Ok(user.into_inner())
    }

    async fn update_user(&self, id: u64, update: &AdminUserUpdate) -> Result<(), ApiError> {
        self.execute(Method::PUT, &format!("users/{id}"), Some(update))
            .await
    }

    async fn delete_user(&self, id: u64) -> Result<(), ApiError> {
        self.execute::<()>(Method::DELETE, &format!("users/{id}"), None)
            .await
    }
}
