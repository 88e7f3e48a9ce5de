use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use study_core::model::{DailyProgress, UserId, WeeklyPlan};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local persistent cache the client falls back to across restarts.
///
/// Holds the last known weekly plan, daily progress and signed-in user id.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Last cached weekly plan, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read or decoded.
    async fn load_plan(&self) -> Result<Option<WeeklyPlan>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the plan cannot be stored.
    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the plan cannot be removed.
    async fn clear_plan(&self) -> Result<(), StorageError>;

    /// Last cached progress, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read or decoded.
    async fn load_progress(&self) -> Result<Option<DailyProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the progress cannot be stored.
    async fn save_progress(&self, progress: &DailyProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the progress cannot be removed.
    async fn clear_progress(&self) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn load_user_id(&self) -> Result<Option<UserId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the id cannot be stored.
    async fn save_user_id(&self, user_id: &UserId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the id cannot be removed.
    async fn clear_user_id(&self) -> Result<(), StorageError>;
}

#[derive(Default)]
struct CacheState {
    plan: Option<WeeklyPlan>,
    progress: Option<DailyProgress>,
    user_id: Option<UserId>,
}

/// Simple in-memory cache implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CacheState) -> T) -> Result<T, StorageError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn load_plan(&self) -> Result<Option<WeeklyPlan>, StorageError> {
        self.with_state(|state| state.plan.clone())
    }

    async fn save_plan(&self, plan: &WeeklyPlan) -> Result<(), StorageError> {
        self.with_state(|state| state.plan = Some(plan.clone()))
    }

    async fn clear_plan(&self) -> Result<(), StorageError> {
        self.with_state(|state| state.plan = None)
    }

    async fn load_progress(&self) -> Result<Option<DailyProgress>, StorageError> {
        self.with_state(|state| state.progress.clone())
    }

    async fn save_progress(&self, progress: &DailyProgress) -> Result<(), StorageError> {
        self.with_state(|state| state.progress = Some(progress.clone()))
    }

    async fn clear_progress(&self) -> Result<(), StorageError> {
        self.with_state(|state| state.progress = None)
    }

    async fn load_user_id(&self) -> Result<Option<UserId>, StorageError> {
        self.with_state(|state| state.user_id.clone())
    }

    async fn save_user_id(&self, user_id: &UserId) -> Result<(), StorageError> {
        self.with_state(|state| state.user_id = Some(user_id.clone()))
    }

    async fn clear_user_id(&self) -> Result<(), StorageError> {
        self.with_state(|state| state.user_id = None)
    }
}

/// Aggregates storage adapters behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub cache: Arc<dyn LocalCache>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            cache: Arc::new(InMemoryCache::new()),
        }
    }
}
