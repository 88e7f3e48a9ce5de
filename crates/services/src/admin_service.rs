use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use study_core::model::{AdminUser, AdminUserUpdate, ChartData, DashboardStats, UserPage};
use tracing::{info, warn};

use crate::backend::AdminBackend;
use crate::error::ApiError;

/// Back-office dashboard and user management.
#[derive(Clone)]
pub struct AdminService {
    backend: Arc<dyn AdminBackend>,
    page: Arc<Mutex<UserPage>>,
}

impl AdminService {
    #[must_use]
    pub fn new(backend: Arc<dyn AdminBackend>) -> Self {
        Self {
            backend,
            page: Arc::default(),
        }
    }

    fn page(&self) -> MutexGuard<'_, UserPage> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails.
    pub async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.backend
            .dashboard_stats()
            .await
            .inspect_err(|err| warn!(error = %err, "failed to load dashboard stats"))
    }

    /// Study sessions over time; empty when unavailable.
    pub async fn study_session_chart(&self) -> ChartData {
        chart_or_empty("study-sessions", self.backend.study_session_chart().await)
    }

    /// Users per career; empty when unavailable.
    pub async fn career_distribution_chart(&self) -> ChartData {
        chart_or_empty(
            "career-distribution",
            self.backend.career_distribution_chart().await,
        )
    }

    /// Load one page of users and remember it as the current page.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails; the current page is kept.
    pub async fn load_users(&self, page: u32) -> Result<UserPage, ApiError> {
        let loaded = self
            .backend
            .list_users(page.max(1))
            .await
            .inspect_err(|err| warn!(error = %err, page, "failed to load users"))?;
        *self.page() = loaded.clone();
        Ok(loaded)
    }

    #[must_use]
    pub fn current_page(&self) -> UserPage {
        self.page().clone()
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the user does not exist or the call fails.
    pub async fn fetch_user(&self, id: u64) -> Result<AdminUser, ApiError> {
        self.backend.fetch_user(id).await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the backend refuses the update.
    pub async fn update_user(&self, id: u64, update: &AdminUserUpdate) -> Result<(), ApiError> {
        self.backend
            .update_user(id, update)
            .await
            .inspect_err(|err| warn!(error = %err, id, "failed to update user"))?;
        info!(id, "updated user");
        Ok(())
    }

    /// Delete a user, then reload the current page so it stays full.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the delete fails. A failed reload is logged only.
    pub async fn delete_user(&self, id: u64) -> Result<(), ApiError> {
        self.backend
            .delete_user(id)
            .await
            .inspect_err(|err| warn!(error = %err, id, "failed to delete user"))?;
        info!(id, "deleted user");

        let current = self.page().current_page.max(1);
        let last = match self.load_users(current).await {
            Ok(page) => page.last_page,
            Err(_) => return Ok(()),
        };
        // Deleting the only user on the last page leaves it empty.
        if current > last {
            let _ = self.load_users(last).await;
        }
        Ok(())
    }
}

fn chart_or_empty(chart: &str, result: Result<ChartData, ApiError>) -> ChartData {
    match result {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => ChartData::default(),
        Err(err) => {
            warn!(error = %err, chart, "failed to load chart");
            ChartData::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, Operation};
    use study_core::time::fixed_clock;

    fn user(id: u64) -> AdminUser {
        AdminUser {
            id,
            name: Some(format!("user {id}")),
            email: None,
            is_premium: false,
            premium_expires_at: None,
        }
    }

    fn seeded(count: u64) -> (InMemoryBackend, AdminService) {
        let backend = InMemoryBackend::new(fixed_clock());
        for id in 1..=count {
            backend.add_admin_user(user(id));
        }
        let service = AdminService::new(Arc::new(backend.clone()));
        (backend, service)
    }

    #[tokio::test]
    async fn charts_degrade_to_empty() {
        let (backend, admin) = seeded(0);
        assert!(admin.study_session_chart().await.is_empty());
        backend.fail(Operation::Admin);
        assert_eq!(admin.career_distribution_chart().await, ChartData::default());
        assert!(admin.stats().await.is_err());
    }

    #[tokio::test]
    async fn pages_users_and_updates() {
        let (_, admin) = seeded(12);
        let page = admin.load_users(2).await.unwrap();
        assert_eq!(page.users.len(), 2);
        assert_eq!(page.last_page, 2);
        assert_eq!(admin.current_page().current_page, 2);

        let update = AdminUserUpdate {
            is_premium: Some(true),
            ..AdminUserUpdate::default()
        };
        admin.update_user(11, &update).await.unwrap();
        assert!(admin.fetch_user(11).await.unwrap().is_premium);
    }

    #[tokio::test]
    async fn delete_refreshes_current_page() {
        let (_, admin) = seeded(11);
        admin.load_users(2).await.unwrap();

        admin.delete_user(11).await.unwrap();
        let page = admin.current_page();
        assert_eq!(page.current_page, 1);
        assert_eq!(page.users.len(), 10);
        assert_eq!(page.total, 10);
    }
}
