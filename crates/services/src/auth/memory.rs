use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use study_core::model::UserId;

use super::{AuthProvider, AuthUser};
use crate::error::AuthError;

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, (String, AuthUser)>,
    current: Option<AuthUser>,
    next_uid: u64,
}

/// In-process identity provider for tests and offline prototyping.
///
/// Tokens are `token-<uid>`.
#[derive(Clone, Default)]
pub struct InMemoryAuth {
    state: Arc<Mutex<AuthState>>,
}

impl InMemoryAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with one account already signed in.
    #[must_use]
    pub fn signed_in(uid: &str) -> Self {
        let auth = Self::new();
        {
            let mut state = auth.state();
            let user = AuthUser {
                uid: UserId::new(uid),
                email: None,
                display_name: None,
            };
            state.current = Some(user);
        }
        auth
    }

    #[must_use]
    pub fn token_for(uid: &UserId) -> String {
        format!("token-{uid}")
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.state().current.clone()
    }

    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .state()
            .current
            .as_ref()
            .map(|user| Self::token_for(&user.uid)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let mut state = self.state();
        let user = match state.accounts.get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            Some(_) => return Err(AuthError::Rejected("INVALID_PASSWORD".into())),
            None => return Err(AuthError::Rejected("EMAIL_NOT_FOUND".into())),
        };
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let mut state = self.state();
        if state.accounts.contains_key(email) {
            return Err(AuthError::Rejected("EMAIL_EXISTS".into()));
        }
        state.next_uid += 1;
        let user = AuthUser {
            uid: UserId::new(format!("uid-{}", state.next_uid)),
            email: Some(email.to_string()),
            display_name: None,
        };
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), user.clone()));
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn update_display_name(&self, name: &str) -> Result<AuthUser, AuthError> {
        let mut state = self.state();
        let user = state.current.as_mut().ok_or(AuthError::NotSignedIn)?;
        user.display_name = Some(name.to_string());
        let user = user.clone();
        if let Some(email) = user.email.clone() {
            if let Some((_, stored)) = state.accounts.get_mut(&email) {
                stored.display_name = user.display_name.clone();
            }
        }
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state().current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = InMemoryAuth::new();
        let user = auth.sign_up("ana@example.com", "pw").await.unwrap();
        auth.update_display_name("Ana").await.unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.id_token().await.unwrap(), None);

        assert!(matches!(
            auth.sign_in("ana@example.com", "nope").await,
            Err(AuthError::Rejected(_))
        ));
        let again = auth.sign_in("ana@example.com", "pw").await.unwrap();
        assert_eq!(again.uid, user.uid);
        assert_eq!(again.display_name.as_deref(), Some("Ana"));
        assert_eq!(
            auth.id_token().await.unwrap(),
            Some(InMemoryAuth::token_for(&user.uid))
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let auth = InMemoryAuth::new();
        auth.sign_up("a@b.c", "pw").await.unwrap();
        assert!(auth.sign_up("a@b.c", "pw").await.is_err());
    }
}
