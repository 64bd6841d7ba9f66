//! REST adapter for the hosted identity provider.
//!
//! ARCHITECTURE
//! ============
//! Every call is a JSON `POST {base}/accounts:{method}?key={api_key}`. The
//! hosted service has no push channel for a native client, so this adapter
//! owns the session-change stream itself: it notifies subscribers whenever
//! one of its own calls changes who is signed in.
//!
//! ERROR HANDLING
//! ==============
//! Server failures arrive as `{"error": {"message": "CODE : detail"}}`.
//! [`translate_server_error`] turns them into canonical `auth/*` codes;
//! transport failures become `auth/network-request-failed`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::federated::{FederatedFlow, FederatedRequest};
use super::listeners::{ListenerSet, Subscription};
use super::{Identity, IdentityProvider, ProfileUpdate, ProviderError, codes};
use crate::config::{FederatedSettings, IdentityConfig};

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl TokenGrant {
    fn into_identity(self) -> Identity {
        Identity {
            uid: self.local_id,
            id_token: self.id_token,
            email: non_empty(self.email),
            display_name: non_empty(self.display_name),
            photo_url: non_empty(self.photo_url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// ERROR TRANSLATION
// =============================================================================

/// Map a server error string (`"WEAK_PASSWORD : Password should be ..."`) to a
/// [`ProviderError`] with a canonical code.
#[must_use]
pub fn translate_server_error(raw: &str) -> ProviderError {
    let (server_code, detail) = match raw.split_once(" : ") {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (raw.trim(), ""),
    };
    let code = match server_code {
        "EMAIL_EXISTS" => codes::EMAIL_IN_USE.to_owned(),
        "INVALID_EMAIL" | "MISSING_EMAIL" => codes::INVALID_EMAIL.to_owned(),
        "WEAK_PASSWORD" => codes::WEAK_PASSWORD.to_owned(),
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => codes::USER_NOT_FOUND.to_owned(),
        "INVALID_PASSWORD" => codes::WRONG_PASSWORD.to_owned(),
        "USER_DISABLED" => codes::USER_DISABLED.to_owned(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => codes::TOO_MANY_REQUESTS.to_owned(),
        "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE" => codes::INVALID_CREDENTIAL.to_owned(),
        "INVALID_ID_TOKEN" => codes::INVALID_USER_TOKEN.to_owned(),
        "TOKEN_EXPIRED" | "USER_TOKEN_EXPIRED" => codes::USER_TOKEN_EXPIRED.to_owned(),
        "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => codes::REQUIRES_RECENT_LOGIN.to_owned(),
        "OPERATION_NOT_ALLOWED" => codes::OPERATION_NOT_ALLOWED.to_owned(),
        other => format!("auth/{}", other.to_ascii_lowercase().replace('_', "-")),
    };
    let message = if detail.is_empty() { server_code } else { detail };
    ProviderError::new(code, message)
}

fn error_from_response(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => translate_server_error(&envelope.error.message),
        Err(_) => ProviderError::internal(format!("identity service returned {status}: {body}")),
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Clears the in-flight flag however the federated attempt ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// [`IdentityProvider`] backed by the hosted REST API.
pub struct RestIdentityProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    federated: FederatedSettings,
    flow: Option<Arc<dyn FederatedFlow>>,
    listeners: ListenerSet,
    federated_in_flight: AtomicBool,
}

impl RestIdentityProvider {
    /// Build the adapter from typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &IdentityConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ProviderError::internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            federated: config.federated.clone(),
            flow: None,
            listeners: ListenerSet::new(),
            federated_in_flight: AtomicBool::new(false),
        })
    }

    /// Attach the interactive step used by federated sign-in.
    #[must_use]
    pub fn with_federated_flow(mut self, flow: Arc<dyn FederatedFlow>) -> Self {
        self.flow = Some(flow);
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}?key={}", self.base_url, self.api_key)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T, ProviderError> {
        debug!(method, "identity request");
        let resp = self
            .http
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(ProviderError::network)?;
        let status = resp.status();
        let text = resp.text().await.map_err(ProviderError::network)?;
        if !status.is_success() {
            let err = error_from_response(status.as_u16(), &text);
            debug!(method, status = status.as_u16(), code = %err.code, "identity request rejected");
            return Err(err);
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::internal(format!("unexpected {method} response: {e}")))
    }

    fn federated_request(&self) -> FederatedRequest {
        let mut request = FederatedRequest::new(&self.federated.provider_id, &self.federated.redirect_uri)
            .with_custom_parameter("prompt", &self.federated.prompt);
        if let Some(client_id) = &self.federated.client_id {
            request = request.with_client_id(client_id);
        }
        request
    }

    fn signed_in(&self, identity: Identity) -> Identity {
        info!(uid = %identity.uid, "identity signed in");
        self.listeners.set_current(Some(identity.clone()));
        identity
    }
}

#[async_trait::async_trait]
impl IdentityProvider for RestIdentityProvider {
    fn subscribe(&self) -> Result<Subscription, ProviderError> {
        Ok(self.listeners.subscribe())
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let body = serde_json::json!({ "email": email, "password": password, "returnSecureToken": true });
        let grant: TokenGrant = self.call("signUp", &body).await?;
        Ok(self.signed_in(grant.into_identity()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let body = serde_json::json!({ "email": email, "password": password, "returnSecureToken": true });
        let grant: TokenGrant = self.call("signInWithPassword", &body).await?;
        Ok(self.signed_in(grant.into_identity()))
    }

    async fn sign_in_with_federated(&self) -> Result<Identity, ProviderError> {
        let Some(flow) = &self.flow else {
            return Err(ProviderError::new(
                codes::OPERATION_NOT_SUPPORTED,
                "no interactive federated flow is configured",
            ));
        };
        if self.federated_in_flight.swap(true, Ordering::AcqRel) {
            return Err(ProviderError::new(
                codes::CANCELLED_POPUP_REQUEST,
                "another federated sign-in is already in progress",
            ));
        }
        let _in_flight = InFlight(&self.federated_in_flight);

        let request = self.federated_request();
        let credential = flow.authorize(&request).await?;
        let body = serde_json::json!({
            "postBody": format!("id_token={}&providerId={}", credential.id_token, request.provider_id),
            "requestUri": request.redirect_uri,
            "returnSecureToken": true,
            "returnIdpCredential": false,
        });
        let grant: TokenGrant = self.call("signInWithIdp", &body).await?;
        Ok(self.signed_in(grant.into_identity()))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.listeners.set_current(None);
        info!("identity signed out");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({ "requestType": "PASSWORD_RESET", "email": email });
        let _: serde_json::Value = self.call("sendOobCode", &body).await?;
        Ok(())
    }

    async fn update_profile(&self, identity: &Identity, update: &ProfileUpdate) -> Result<(), ProviderError> {
        let mut body = serde_json::json!({ "idToken": identity.id_token, "returnSecureToken": false });
        if let Some(name) = &update.display_name {
            body["displayName"] = serde_json::Value::String(name.clone());
        }
        if let Some(url) = &update.photo_url {
            body["photoUrl"] = serde_json::Value::String(url.clone());
        }
        let resp: UpdateResponse = self.call("update", &body).await?;

        let local = identity.with_profile(update);
        let updated = Identity {
            uid: local.uid,
            id_token: resp.id_token.unwrap_or(local.id_token),
            email: non_empty(resp.email).or(local.email),
            display_name: non_empty(resp.display_name).or(local.display_name),
            photo_url: non_empty(resp.photo_url).or(local.photo_url),
        };
        if self.listeners.is_current(&updated.uid) {
            self.listeners.set_current(Some(updated));
        }
        Ok(())
    }

    async fn reload(&self, identity: &Identity) -> Result<Identity, ProviderError> {
        let body = serde_json::json!({ "idToken": identity.id_token });
        let resp: LookupResponse = self.call("lookup", &body).await?;
        let Some(account) = resp.users.into_iter().next() else {
            return Err(ProviderError::new(codes::USER_NOT_FOUND, "no account for this token"));
        };
        if account.disabled {
            return Err(ProviderError::new(codes::USER_DISABLED, "account disabled"));
        }
        let fresh = Identity {
            uid: account.local_id,
            id_token: identity.id_token.clone(),
            email: non_empty(account.email),
            display_name: non_empty(account.display_name),
            photo_url: non_empty(account.photo_url),
        };
        self.listeners.refresh_current(&fresh);
        Ok(fresh)
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
