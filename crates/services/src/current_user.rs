use std::sync::{Arc, Mutex, PoisonError};

use study_core::model::UserId;

/// The resolved user id, shared by every service that scopes calls to a user.
///
/// Written by `UserService`; read by the record store.
#[derive(Clone, Default, Debug)]
pub struct CurrentUser {
    inner: Arc<Mutex<Option<UserId>>>,
}

impl CurrentUser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<UserId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, user: UserId) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
