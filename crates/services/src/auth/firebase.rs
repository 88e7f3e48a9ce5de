use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use study_core::model::UserId;
use tracing::{debug, info};

use super::{AuthProvider, AuthUser};
use crate::Clock;
use crate::error::AuthError;

/// Tokens are refreshed once they are this close to expiring.
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Base URLs of the Identity Toolkit and Secure Token REST APIs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirebaseEndpoints {
    pub identity: String,
    pub secure_token: String,
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        Self {
            identity: "https://identitytoolkit.googleapis.com/v1".into(),
            secure_token: "https://securetoken.googleapis.com/v1".into(),
        }
    }
}

impl FirebaseEndpoints {
    /// Route both APIs to one host, as an emulator or test server does.
    #[must_use]
    pub fn at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            identity: format!("{base}/v1"),
            secure_token: format!("{base}/v1"),
        }
    }
}

#[derive(Debug, Clone)]
struct FirebaseSession {
    user: AuthUser,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl FirebaseSession {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES) >= self.expires_at
    }
}

/// Email/password accounts through the Firebase Auth REST API.
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    endpoints: FirebaseEndpoints,
    clock: Clock,
    session: Mutex<Option<FirebaseSession>>,
}

impl FirebaseAuth {
    #[must_use]
    pub fn new(client: Client, api_key: impl Into<String>, clock: Clock) -> Self {
        Self::with_endpoints(client, api_key, FirebaseEndpoints::default(), clock)
    }

    #[must_use]
    pub fn with_endpoints(
        client: Client,
        api_key: impl Into<String>,
        endpoints: FirebaseEndpoints,
        clock: Clock,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoints,
            clock,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<FirebaseSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn post<B, T>(&self, url: String, body: &B) -> Result<T, AuthError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Identity Toolkit explains rejections as {"error": {"message": "EMAIL_EXISTS"}}.
            return Err(match response.json::<ErrorResponse>().await {
                Ok(body) => AuthError::Rejected(body.error.message),
                Err(_) => AuthError::HttpStatus(status),
            });
        }
        Ok(response.json().await?)
    }

    async fn password_flow(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let url = format!("{}/accounts:{method}", self.endpoints.identity);
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post(url, &body).await?;
        let session = FirebaseSession {
            user: response.user(),
            id_token: response.id_token.unwrap_or_default(),
            refresh_token: response.refresh_token.unwrap_or_default(),
            expires_at: self.expiry(response.expires_in.as_deref()),
        };
        let user = session.user.clone();
        *self.session() = Some(session);
        info!(uid = %user.uid, method, "signed in");
        Ok(user)
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, AuthError> {
        let url = format!("{}/token", self.endpoints.secure_token);
        let body = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token: &refresh_token,
        };
        let response: RefreshResponse = self.post(url, &body).await?;
        let expires_at = self.expiry(response.expires_in.as_deref());

        let mut guard = self.session();
        let session = guard.as_mut().ok_or(AuthError::NotSignedIn)?;
        session.id_token.clone_from(&response.id_token);
        session.refresh_token = response.refresh_token;
        session.expires_at = expires_at;
        debug!(uid = %session.user.uid, %expires_at, "refreshed id token");
        Ok(response.id_token)
    }

    fn expiry(&self, expires_in: Option<&str>) -> DateTime<Utc> {
        let secs = expires_in
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(3600);
        self.clock.now() + Duration::seconds(secs)
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.session().as_ref().map(|session| session.user.clone())
    }

    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        let stale = {
            let guard = self.session();
            match guard.as_ref() {
                None => return Ok(None),
                Some(session) if !session.needs_refresh(self.clock.now()) => {
                    return Ok(Some(session.id_token.clone()));
                }
                Some(session) => session.refresh_token.clone(),
            }
        };
        self.refresh(stale).await.map(Some)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.password_flow("signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.password_flow("signUp", email, password).await
    }

    async fn update_display_name(&self, name: &str) -> Result<AuthUser, AuthError> {
        let id_token = self.id_token().await?.ok_or(AuthError::NotSignedIn)?;
        let url = format!("{}/accounts:update", self.endpoints.identity);
        let body = UpdateRequest {
            id_token: &id_token,
            display_name: name,
            return_secure_token: false,
        };
        let response: AccountResponse = self.post(url, &body).await?;

        let mut guard = self.session();
        let session = guard.as_mut().ok_or(AuthError::NotSignedIn)?;
        session.user.display_name = response.display_name.or_else(|| Some(name.to_string()));
        Ok(session.user.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.session().take() {
            info!(uid = %session.user.uid, "signed out");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

impl AccountResponse {
    fn user(&self) -> AuthUser {
        AuthUser {
            uid: UserId::new(self.local_id.clone()),
            email: self.email.clone(),
            display_name: self.display_name.clone().filter(|name| !name.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use study_core::time::fixed_clock;

    fn provider(server: &mockito::Server) -> FirebaseAuth {
        FirebaseAuth::with_endpoints(
            Client::new(),
            "test-key",
            FirebaseEndpoints::at(&server.url()),
            fixed_clock(),
        )
    }

    fn account_body(expires_in: &str) -> String {
        format!(
            r#"{{"localId":"uid-1","email":"ana@example.com","displayName":"",
                "idToken":"id-1","refreshToken":"refresh-1","expiresIn":"{expires_in}"}}"#
        )
    }

    #[tokio::test]
    async fn sign_in_stores_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/accounts:signInWithPassword")
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "email": "ana@example.com",
                "returnSecureToken": true
            })))
            .with_header("content-type", "application/json")
            .with_body(account_body("3600"))
            .create_async()
            .await;

        let auth = provider(&server);
        assert!(!auth.is_signed_in());
        let user = auth.sign_in("ana@example.com", "secret").await.unwrap();
        mock.assert_async().await;

        assert_eq!(user.uid, UserId::new("uid-1"));
        assert_eq!(user.display_name, None);
        assert_eq!(auth.id_token().await.unwrap().as_deref(), Some("id-1"));

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());
        assert_eq!(auth.id_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_credentials_surface_provider_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":400,"message":"INVALID_PASSWORD"}}"#)
            .create_async()
            .await;

        let auth = provider(&server);
        let err = auth.sign_in("ana@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(message) if message == "INVALID_PASSWORD"));
        assert!(!auth.is_signed_in());
    }

    #[tokio::test]
    async fn token_near_expiry_is_refreshed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/accounts:signUp")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(account_body("120"))
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/v1/token")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": "refresh-1"
            })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"id_token":"id-2","refresh_token":"refresh-2","expires_in":"3600"}"#)
            .expect(1)
            .create_async()
            .await;

        let auth = provider(&server);
        auth.sign_up("ana@example.com", "secret").await.unwrap();

        assert_eq!(auth.id_token().await.unwrap().as_deref(), Some("id-2"));
        // The refreshed token is good for an hour, so no second refresh.
        assert_eq!(auth.id_token().await.unwrap().as_deref(), Some("id-2"));
        refresh.assert_async().await;
    }
}
