use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const API_BASE_URL_VAR: &str = "STUDY_API_BASE_URL";
pub const FIREBASE_API_KEY_VAR: &str = "STUDY_FIREBASE_API_KEY";
pub const DB_URL_VAR: &str = "STUDY_DB_URL";
pub const HTTP_TIMEOUT_VAR: &str = "STUDY_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";
pub const DEFAULT_DB_URL: &str = "sqlite://study-cache.sqlite3";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Connection settings for the backend, identity provider and local cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Always ends with `/` so relative routes join underneath it.
    pub api_base_url: Url,
    pub firebase_api_key: Option<String>,
    pub db_url: String,
    pub http_timeout: Duration,
}

impl ClientConfig {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or blank keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` for a malformed base URL and
    /// `ConfigError::InvalidTimeout` for a timeout that is not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_base_url = parse_base_url(
            API_BASE_URL_VAR,
            value(API_BASE_URL_VAR).as_deref().unwrap_or(DEFAULT_API_BASE_URL),
        )?;

        let http_timeout = match value(HTTP_TIMEOUT_VAR) {
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        key: HTTP_TIMEOUT_VAR,
                        value: raw,
                    });
                }
            },
        };

        Ok(Self {
            api_base_url,
            firebase_api_key: value(FIREBASE_API_KEY_VAR),
            db_url: value(DB_URL_VAR).unwrap_or_else(|| DEFAULT_DB_URL.to_string()),
            http_timeout,
        })
    }

    /// Override the backend base URL, e.g. from a command-line flag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `raw` is not an absolute http(s) URL.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base_url = parse_base_url(API_BASE_URL_VAR, raw)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_db_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = db_url.into();
        self
    }
}

fn parse_base_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl { key, reason };
    let mut url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
