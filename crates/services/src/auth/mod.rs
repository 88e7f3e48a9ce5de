//! Identity provider seam.
//!
//! The rest of the crate only needs three things from it: who is signed in,
//! a bearer token for backend calls, and the email/password flows.

mod firebase;
mod memory;

use async_trait::async_trait;
use study_core::model::UserId;

use crate::error::AuthError;

pub use firebase::{FirebaseAuth, FirebaseEndpoints};
pub use memory::InMemoryAuth;

/// The signed-in account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }

    /// Token for the `Authorization` header, refreshed when close to expiry.
    /// `None` while signed out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if a refresh is needed and fails.
    async fn id_token(&self) -> Result<Option<String>, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Rejected` for bad credentials.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// Create an account and sign into it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` if the provider refuses the account.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` when nobody is signed in.
    async fn update_display_name(&self, name: &str) -> Result<AuthUser, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError` if the provider cannot end the session.
    async fn sign_out(&self) -> Result<(), AuthError>;
}
