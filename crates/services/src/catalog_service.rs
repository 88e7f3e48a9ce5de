use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use study_core::model::{Career, DEFAULT_CAREER_ICON, Subject, SubjectId, subject_name};
use tracing::{info, warn};

use crate::backend::StudyBackend;
use crate::error::{ApiError, CatalogError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validated_name(name: &str) -> Result<&str, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    Ok(name)
}

/// Shared list of every subject, fetched once and reused.
#[derive(Clone)]
pub struct SubjectCatalog {
    backend: Arc<dyn StudyBackend>,
    subjects: Arc<Mutex<Vec<Subject>>>,
}

impl SubjectCatalog {
    #[must_use]
    pub fn new(backend: Arc<dyn StudyBackend>) -> Self {
        Self {
            backend,
            subjects: Arc::default(),
        }
    }

    /// Load the catalog unless it is already loaded.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails; the cached list is kept.
    pub async fn fetch(&self, force: bool) -> Result<(), ApiError> {
        if !force && !self.is_empty() {
            return Ok(());
        }
        match self.backend.list_subjects().await {
            Ok(subjects) => {
                *locked(&self.subjects) = subjects;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch subjects");
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn subjects(&self) -> Vec<Subject> {
        locked(&self.subjects).clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        locked(&self.subjects).is_empty()
    }

    #[must_use]
    pub fn name_of(&self, id: SubjectId) -> Option<String> {
        subject_name(&locked(&self.subjects), id).map(str::to_owned)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::EmptyName` for a blank name and
    /// `CatalogError::Api` if the backend rejects it.
    pub async fn create(&self, name: &str) -> Result<Subject, CatalogError> {
        let name = validated_name(name)?;
        let subject = self.backend.create_subject(name).await.inspect_err(|err| {
            warn!(error = %err, subject = name, "failed to create subject");
        })?;
        info!(id = %subject.id, name = %subject.name, "created subject");
        locked(&self.subjects).push(subject.clone());
        Ok(subject)
    }
}

/// Career tracks offered at sign-up.
#[derive(Clone)]
pub struct CareerCatalog {
    backend: Arc<dyn StudyBackend>,
    careers: Arc<Mutex<Vec<Career>>>,
}

impl CareerCatalog {
    #[must_use]
    pub fn new(backend: Arc<dyn StudyBackend>) -> Self {
        Self {
            backend,
            careers: Arc::default(),
        }
    }

    /// Always refetches; the list is short and changes from the admin side.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails; the cached list is kept.
    pub async fn fetch(&self) -> Result<(), ApiError> {
        match self.backend.list_careers().await {
            Ok(careers) => {
                *locked(&self.careers) = careers;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch careers");
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn careers(&self) -> Vec<Career> {
        locked(&self.careers).clone()
    }

    /// Create a career; without an icon it gets `DEFAULT_CAREER_ICON`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::EmptyName` for a blank name and
    /// `CatalogError::Api` if the backend rejects it.
    pub async fn create(&self, name: &str, icon: Option<&str>) -> Result<Career, CatalogError> {
        let name = validated_name(name)?;
        let icon = icon
            .map(str::trim)
            .filter(|icon| !icon.is_empty())
            .unwrap_or(DEFAULT_CAREER_ICON);
        let career = self
            .backend
            .create_career(name, icon)
            .await
            .inspect_err(|err| warn!(error = %err, career = name, "failed to create career"))?;
        info!(id = %career.id, name = %career.name, "created career");
        locked(&self.careers).push(career.clone());
        Ok(career)
    }
}
