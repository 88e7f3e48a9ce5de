use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage::repository::LocalCache;
use study_core::guard::{AccessState, Navigation, Route, guard};
use study_core::model::{Career, CareerId, Subject, SubjectId, UserId, UserProfile};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::auth::{AuthProvider, AuthUser};
use crate::backend::StudyBackend;
use crate::catalog_service::SubjectCatalog;
use crate::current_user::CurrentUser;
use crate::error::UserError;

/// The career a user prepares for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareerChoice {
    pub id: CareerId,
    pub name: Option<String>,
}

#[derive(Debug, Default)]
struct UserState {
    profile: UserProfile,
    career: Option<CareerChoice>,
    career_checked: bool,
    subjects: Vec<SubjectId>,
    subjects_loaded: bool,
}

/// Account state: identity, premium flags, career and subject selection.
#[derive(Clone)]
pub struct UserService {
    clock: Clock,
    auth: Arc<dyn AuthProvider>,
    backend: Arc<dyn StudyBackend>,
    cache: Arc<dyn LocalCache>,
    catalog: SubjectCatalog,
    current: CurrentUser,
    state: Arc<Mutex<UserState>>,
}

impl UserService {
    #[must_use]
    pub fn new(
        clock: Clock,
        auth: Arc<dyn AuthProvider>,
        backend: Arc<dyn StudyBackend>,
        cache: Arc<dyn LocalCache>,
        catalog: SubjectCatalog,
        current: CurrentUser,
    ) -> Self {
        Self {
            clock,
            auth,
            backend,
            cache,
            catalog,
            current,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, UserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_user(&self) -> Result<UserId, UserError> {
        self.current.get().ok_or(UserError::NoUser)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.current.get()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.auth.current_user()
    }

    #[must_use]
    pub fn profile(&self) -> UserProfile {
        self.state().profile.clone()
    }

    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.state().profile.is_premium_at(self.clock.now())
    }

    #[must_use]
    pub fn career(&self) -> Option<CareerChoice> {
        self.state().career.clone()
    }

    //
    // ─── SESSION ───────────────────────────────────────────────────────────────
    //

    /// Work out who the user is and load their profile.
    ///
    /// The identity provider wins; without a signed-in user the id cached by
    /// an earlier run is used. Returns the resolved id, if any.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Api` if the profile cannot be fetched; the id is
    /// still resolved.
    pub async fn initialize(&self) -> Result<Option<UserId>, UserError> {
        let Some(user) = self.resolve_user_id().await else {
            debug!("no signed-in or cached user");
            return Ok(None);
        };
        self.refresh_profile().await?;
        Ok(Some(user))
    }

    async fn resolve_user_id(&self) -> Option<UserId> {
        if let Some(user) = self.auth.current_user() {
            self.remember(&user.uid).await;
            return Some(user.uid);
        }
        match self.cache.load_user_id().await {
            Ok(Some(user)) => {
                self.current.set(user.clone());
                Some(user)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read cached user id");
                None
            }
        }
    }

    async fn remember(&self, user: &UserId) {
        self.current.set(user.clone());
        if let Err(err) = self.cache.save_user_id(user).await {
            warn!(error = %err, "failed to cache user id");
        }
    }

    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend call fails; the previous profile is kept.
    pub async fn refresh_profile(&self) -> Result<UserProfile, UserError> {
        let user = self.require_user()?;
        let profile = self
            .backend
            .fetch_profile(&user)
            .await
            .inspect_err(|err| warn!(error = %err, "failed to fetch user profile"))?;
        self.state().profile = profile.clone();
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `UserError::Auth` for rejected credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser, UserError> {
        let user = self.auth.sign_in(email, password).await?;
        self.reset_state();
        self.remember(&user.uid).await;
        if let Err(err) = self.refresh_profile().await {
            debug!(error = %err, "profile unavailable after login");
        }
        info!(uid = %user.uid, "logged in");
        Ok(user)
    }

    /// Create an account, set its display name and announce it to the backend.
    ///
    /// A failed announcement is logged only; the backend also creates users
    /// lazily.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Auth` if the identity provider refuses the account
    /// or the display name.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthUser, UserError> {
        let mut user = self.auth.sign_up(email, password).await?;
        if let Some(name) = display_name.map(str::trim).filter(|name| !name.is_empty()) {
            user = self.auth.update_display_name(name).await?;
        }
        self.reset_state();
        self.remember(&user.uid).await;
        if let Err(err) = self.backend.sync_registration().await {
            warn!(error = %err, uid = %user.uid, "failed to sync new user with backend");
        }
        info!(uid = %user.uid, "registered");
        Ok(user)
    }

    /// Sign out and forget everything about the user, cached id included.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Auth` if the identity provider fails to sign out;
    /// local state is cleared regardless.
    pub async fn logout(&self) -> Result<(), UserError> {
        let signed_out = self.auth.sign_out().await;
        self.reset_state();
        self.current.clear();
        if let Err(err) = self.cache.clear_user_id().await {
            warn!(error = %err, "failed to clear cached user id");
        }
        signed_out?;
        info!("logged out");
        Ok(())
    }

    fn reset_state(&self) {
        *self.state() = UserState::default();
    }

    //
    // ─── CAREER ────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend refuses; local state is unchanged on error.
    pub async fn save_career(&self, career: &Career) -> Result<(), UserError> {
        let user = self.require_user()?;
        self.backend
            .save_user_career(&user, career.id)
            .await
            .inspect_err(|err| warn!(error = %err, career = %career.id, "failed to save career"))?;
        let mut state = self.state();
        state.career = Some(CareerChoice {
            id: career.id,
            name: Some(career.name.clone()),
        });
        state.career_checked = true;
        info!(career = %career.id, "saved career");
        Ok(())
    }

    /// Whether the user has picked a career. Cached after the first answer
    /// unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend fails.
    pub async fn check_career(&self, force: bool) -> Result<bool, UserError> {
        {
            let state = self.state();
            if state.career_checked && !force {
                return Ok(state.career.is_some());
            }
        }
        let user = self.require_user()?;
        let career = match self.backend.user_career(&user).await {
            Ok(Some(id)) => {
                let name = match self.backend.user_career_name(&user).await {
                    Ok(name) => name,
                    Err(err) => {
                        debug!(error = %err, "career name unavailable");
                        None
                    }
                };
                Some(CareerChoice { id, name })
            }
            Ok(None) => None,
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                warn!(error = %err, "failed to check user career");
                return Err(err.into());
            }
        };

        let mut state = self.state();
        let has_career = career.is_some();
        state.career = career;
        state.career_checked = true;
        Ok(has_career)
    }

    //
    // ─── SUBJECTS ──────────────────────────────────────────────────────────────
    //

    /// Load the user's selected subject ids unless already loaded.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend fails. A 404 means nothing selected yet and is not an error.
    pub async fn fetch_subjects(&self, force: bool) -> Result<Vec<SubjectId>, UserError> {
        {
            let state = self.state();
            if state.subjects_loaded && !force {
                return Ok(state.subjects.clone());
            }
        }
        let user = self.require_user()?;
        let subjects = match self.backend.user_subjects(&user).await {
            Ok(subjects) => subjects,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to fetch user subjects");
                return Err(err.into());
            }
        };

        let mut state = self.state();
        state.subjects.clone_from(&subjects);
        state.subjects_loaded = true;
        Ok(subjects)
    }

    /// Add subjects to the selection.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend refuses.
    pub async fn add_subjects(&self, subjects: &[SubjectId]) -> Result<(), UserError> {
        let user = self.require_user()?;
        self.backend
            .save_user_subjects(&user, subjects, &[])
            .await
            .inspect_err(|err| warn!(error = %err, "failed to add user subjects"))?;
        let mut state = self.state();
        for id in subjects {
            if !state.subjects.contains(id) {
                state.subjects.push(*id);
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend refuses.
    pub async fn remove_subject(&self, subject: SubjectId) -> Result<(), UserError> {
        let user = self.require_user()?;
        self.backend
            .deactivate_user_subject(&user, subject)
            .await
            .inspect_err(|err| warn!(error = %err, %subject, "failed to remove user subject"))?;
        self.state().subjects.retain(|id| *id != subject);
        Ok(())
    }

    /// Replace the selection. Subjects that were selected before and are
    /// missing from `selected` are deactivated in the same call.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NoUser` before sign-in and `UserError::Api` if the
    /// backend refuses; the local selection is unchanged on error.
    pub async fn save_subjects(&self, selected: &[SubjectId]) -> Result<(), UserError> {
        let user = self.require_user()?;
        let deactivate: Vec<SubjectId> = self
            .state()
            .subjects
            .iter()
            .copied()
            .filter(|id| !selected.contains(id))
            .collect();
        self.backend
            .save_user_subjects(&user, selected, &deactivate)
            .await
            .inspect_err(|err| warn!(error = %err, "failed to save user subjects"))?;

        let mut state = self.state();
        state.subjects = selected.to_vec();
        state.subjects_loaded = true;
        info!(
            selected = selected.len(),
            deactivated = deactivate.len(),
            "saved subject selection"
        );
        Ok(())
    }

    #[must_use]
    pub fn selected_subject_ids(&self) -> Vec<SubjectId> {
        self.state().subjects.clone()
    }

    /// Selected subjects joined with the catalog; unknown ids are skipped.
    #[must_use]
    pub fn selected_subjects(&self) -> Vec<Subject> {
        let selected = self.selected_subject_ids();
        self.catalog
            .subjects()
            .into_iter()
            .filter(|subject| selected.contains(&subject.id))
            .collect()
    }

    //
    // ─── ROUTING ───────────────────────────────────────────────────────────────
    //

    /// Facts the route guard needs, from what is loaded right now.
    #[must_use]
    pub fn access_state(&self) -> AccessState {
        let now = self.clock.now();
        let state = self.state();
        AccessState {
            logged_in: self.auth.is_signed_in(),
            premium: state.profile.is_premium_at(now),
            has_career: state.career.is_some(),
            selected_subjects: state.subjects.len(),
        }
    }

    /// Decide a navigation, loading career and subjects first if needed.
    pub async fn navigate(&self, route: Route) -> Navigation {
        if self.auth.is_signed_in() && self.current.get().is_some() {
            if let Err(err) = self.check_career(false).await {
                debug!(error = %err, "career check failed during navigation");
            }
            if let Err(err) = self.fetch_subjects(false).await {
                debug!(error = %err, "subject fetch failed during navigation");
            }
        }
        let decision = guard(route, &self.access_state());
        debug!(%route, ?decision, "route guard");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryAuth;
    use crate::backend::{InMemoryBackend, Operation};
    use chrono::Duration;
    use storage::repository::InMemoryCache;
    use study_core::time::{fixed_clock, fixed_now};

    struct Harness {
        auth: InMemoryAuth,
        backend: InMemoryBackend,
        cache: InMemoryCache,
        users: UserService,
    }

    fn harness(auth: InMemoryAuth) -> Harness {
        let clock = fixed_clock();
        let backend = InMemoryBackend::new(clock);
        let cache = InMemoryCache::new();
        let shared: Arc<dyn StudyBackend> = Arc::new(backend.clone());
        let users = UserService::new(
            clock,
            Arc::new(auth.clone()),
            Arc::clone(&shared),
            Arc::new(cache.clone()),
            SubjectCatalog::new(shared),
            CurrentUser::new(),
        );
        Harness {
            auth,
            backend,
            cache,
            users,
        }
    }

    #[tokio::test]
    async fn initialize_prefers_auth_and_caches_the_id() {
        let h = harness(InMemoryAuth::signed_in("uid-7"));
        h.backend.set_profile(
            &UserId::new("uid-7"),
            UserProfile {
                is_premium: true,
                premium_expires_at: Some(fixed_now() + Duration::days(3)),
            },
        );

        let user = h.users.initialize().await.unwrap();
        assert_eq!(user, Some(UserId::new("uid-7")));
        assert!(h.users.is_premium());
        assert_eq!(
            h.cache.load_user_id().await.unwrap(),
            Some(UserId::new("uid-7"))
        );
    }

    #[tokio::test]
    async fn initialize_falls_back_to_cached_id() {
        let h = harness(InMemoryAuth::new());
        h.cache.save_user_id(&UserId::new("cached")).await.unwrap();
        assert_eq!(
            h.users.initialize().await.unwrap(),
            Some(UserId::new("cached"))
        );
        assert_eq!(h.users.user_id(), Some(UserId::new("cached")));
    }

    #[tokio::test]
    async fn register_survives_failed_backend_sync() {
        let h = harness(InMemoryAuth::new());
        h.backend.fail(Operation::SyncRegistration);
        let user = h
            .users
            .register("ana@example.com", "pw", Some("Ana"))
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Ana"));
        assert_eq!(h.users.user_id(), Some(user.uid));
        assert_eq!(h.backend.registrations(), 0);
    }

    #[tokio::test]
    async fn logout_clears_user_and_cache() {
        let h = harness(InMemoryAuth::new());
        h.users.register("a@b.c", "pw", None).await.unwrap();
        assert_eq!(h.backend.registrations(), 1);

        h.users.logout().await.unwrap();
        assert_eq!(h.users.user_id(), None);
        assert!(!h.auth.is_signed_in());
        assert_eq!(h.cache.load_user_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn career_check_is_cached_and_404_means_none() {
        let h = harness(InMemoryAuth::signed_in("u1"));
        h.users.initialize().await.unwrap();
        assert!(!h.users.check_career(false).await.unwrap());

        let career = h.backend.add_career("Diplomacy");
        h.backend
            .save_user_career(&UserId::new("u1"), career.id)
            .await
            .unwrap();
        // Still the cached answer until forced.
        assert!(!h.users.check_career(false).await.unwrap());
        assert!(h.users.check_career(true).await.unwrap());
        assert_eq!(
            h.users.career(),
            Some(CareerChoice {
                id: career.id,
                name: Some("Diplomacy".into())
            })
        );
    }

    #[tokio::test]
    async fn failed_career_save_changes_nothing() {
        let h = harness(InMemoryAuth::signed_in("u1"));
        h.users.initialize().await.unwrap();
        let career = h.backend.add_career("Diplomacy");
        h.backend.fail(Operation::SaveUserCareer);
        assert!(h.users.save_career(&career).await.is_err());
        assert_eq!(h.users.career(), None);

        h.backend.recover(Operation::SaveUserCareer);
        h.users.save_career(&career).await.unwrap();
        assert!(h.users.check_career(false).await.unwrap());
    }

    #[tokio::test]
    async fn save_subjects_deactivates_unselected() {
        let h = harness(InMemoryAuth::signed_in("u1"));
        h.users.initialize().await.unwrap();
        let math = h.backend.add_subject("Math").id;
        let law = h.backend.add_subject("Law").id;
        let art = h.backend.add_subject("Art").id;

        assert!(h.users.fetch_subjects(false).await.unwrap().is_empty());
        h.users.add_subjects(&[math, law]).await.unwrap();
        h.users.save_subjects(&[law, art]).await.unwrap();

        assert_eq!(h.users.selected_subject_ids(), vec![law, art]);
        let mut remote = h.backend.user_subject_ids(&UserId::new("u1"));
        remote.sort();
        assert_eq!(remote, vec![law, art]);

        h.users.remove_subject(law).await.unwrap();
        assert_eq!(h.users.selected_subject_ids(), vec![art]);
    }

    #[tokio::test]
    async fn navigation_follows_account_state() {
        let h = harness(InMemoryAuth::new());
        assert_eq!(
            h.users.navigate(Route::History).await,
            Navigation::Redirect(Route::Login)
        );

        h.users.register("a@b.c", "pw", None).await.unwrap();
        assert_eq!(
            h.users.navigate(Route::History).await,
            Navigation::Redirect(Route::CareerSelection)
        );

        let career = h.backend.add_career("Diplomacy");
        h.users.save_career(&career).await.unwrap();
        let math = h.backend.add_subject("Math").id;
        h.users.save_subjects(&[math]).await.unwrap();
        assert_eq!(h.users.navigate(Route::History).await, Navigation::Allow);
        assert_eq!(
            h.users.navigate(Route::StudyCycle).await,
            Navigation::Redirect(Route::Premium)
        );
    }
}
