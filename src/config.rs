//! Configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_FEDERATED_PROVIDER_ID: &str = "google.com";
pub const DEFAULT_FEDERATED_PROMPT: &str = "select_account";
pub const DEFAULT_FEDERATED_REDIRECT_URI: &str = "http://localhost";
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTH_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SESSION_SUBSCRIBE_RETRIES: u32 = 3;
pub const DEFAULT_SESSION_SUBSCRIBE_BACKOFF_MS: u64 = 250;
pub const DEFAULT_SESSION_SUBSCRIBE_MAX_BACKOFF_MS: u64 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingVar { var: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_AUTH_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_AUTH_CONNECT_TIMEOUT_SECS }
    }
}

/// How federated sign-in is requested from the IdP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedSettings {
    pub provider_id: String,
    /// Value of the `prompt` custom parameter (`select_account` forces the account chooser).
    pub prompt: String,
    pub client_id: Option<String>,
    pub redirect_uri: String,
}

impl Default for FederatedSettings {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_FEDERATED_PROVIDER_ID.to_owned(),
            prompt: DEFAULT_FEDERATED_PROMPT.to_owned(),
            client_id: None,
            redirect_uri: DEFAULT_FEDERATED_REDIRECT_URI.to_owned(),
        }
    }
}

/// Settings for the REST identity adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: String,
    /// REST base URL without a trailing slash.
    pub base_url: String,
    pub federated: FederatedSettings,
    pub timeouts: HttpTimeouts,
}

impl IdentityConfig {
    /// Config with default federated settings and timeouts.
    #[must_use]
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            federated: FederatedSettings::default(),
            timeouts: HttpTimeouts::default(),
        }
    }

    /// Build typed identity config from environment variables.
    ///
    /// Required:
    /// - `FIREBASE_API_KEY`
    ///
    /// Optional:
    /// - `IDENTITY_BASE_URL`: default `https://identitytoolkit.googleapis.com/v1`
    /// - `FEDERATED_PROVIDER_ID`: default `google.com`
    /// - `FEDERATED_PROMPT`: default `select_account`
    /// - `FEDERATED_CLIENT_ID`: no default; the console flow needs it
    /// - `FEDERATED_REDIRECT_URI`: default `http://localhost`
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] when the API key is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("FIREBASE_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar { var: "FIREBASE_API_KEY".into() })?;
        let base_url = std::env::var("IDENTITY_BASE_URL").unwrap_or_else(|_| DEFAULT_IDENTITY_BASE_URL.to_owned());

        let mut config = Self::new(api_key, &base_url);
        config.federated = FederatedSettings {
            provider_id: env_or("FEDERATED_PROVIDER_ID", DEFAULT_FEDERATED_PROVIDER_ID),
            prompt: env_or("FEDERATED_PROMPT", DEFAULT_FEDERATED_PROMPT),
            client_id: std::env::var("FEDERATED_CLIENT_ID").ok().filter(|v| !v.trim().is_empty()),
            redirect_uri: env_or("FEDERATED_REDIRECT_URI", DEFAULT_FEDERATED_REDIRECT_URI),
        };
        config.timeouts = HttpTimeouts {
            request_secs: env_parse("AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_AUTH_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_AUTH_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }
}

/// How the session façade recovers when its push subscription breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPolicy {
    /// Re-subscribe attempts before the session is declared lost.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl SubscriptionPolicy {
    /// Load from `SESSION_SUBSCRIBE_RETRIES`, `SESSION_SUBSCRIBE_BACKOFF_MS`,
    /// `SESSION_SUBSCRIBE_MAX_BACKOFF_MS`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_retries: env_parse("SESSION_SUBSCRIBE_RETRIES", DEFAULT_SESSION_SUBSCRIBE_RETRIES),
            base_backoff: Duration::from_millis(env_parse(
                "SESSION_SUBSCRIBE_BACKOFF_MS",
                DEFAULT_SESSION_SUBSCRIBE_BACKOFF_MS,
            )),
            max_backoff: Duration::from_millis(env_parse(
                "SESSION_SUBSCRIBE_MAX_BACKOFF_MS",
                DEFAULT_SESSION_SUBSCRIBE_MAX_BACKOFF_MS,
            )),
        }
    }

    /// Delay before re-subscribe attempt `attempt` (1-based): doubling from
    /// `base_backoff`, capped at `max_backoff`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_SESSION_SUBSCRIBE_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_SESSION_SUBSCRIBE_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_SESSION_SUBSCRIBE_MAX_BACKOFF_MS),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
