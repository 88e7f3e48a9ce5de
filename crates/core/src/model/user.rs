use chrono::{DateTime, Utc};

/// Account flags kept by the backend for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Premium counts only until its expiry, when one is set.
    #[must_use]
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expires_at.is_none_or(|expires| expires > now)
    }
}
