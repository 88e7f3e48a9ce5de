//! Shared error types for the services crate.

use reqwest::StatusCode;
use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::{PlanError, RecordError};
use study_core::timer::TimerError;

/// Errors emitted by the identity provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
    #[error("identity provider request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by backend clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request requires a signed-in user")]
    NotAuthenticated,
    #[error("backend request failed with status {0}")]
    HttpStatus(StatusCode),
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
    #[error("invalid request path: {0}")]
    InvalidPath(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// True for a 404 response, which several endpoints use for "nothing yet".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::HttpStatus(status) if *status == StatusCode::NOT_FOUND)
    }
}

/// Errors emitted by `ScheduleTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `SubjectCatalog` and `CareerCatalog`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `RecordStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordStoreError {
    #[error("no user id is known; sign in first")]
    NoUser,
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `UserService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserError {
    #[error("no user id is known; sign in first")]
    NoUser,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `StudySessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("choose a subject before starting the timer")]
    NoSubject,
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] RecordStoreError),
}

/// Errors raised while reading client configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },
    #[error("{key} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { key: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
