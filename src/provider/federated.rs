//! Federated (third-party IdP) sign-in plumbing.
//!
//! The interactive part of a federated sign-in (popup, browser redirect,
//! device prompt) is injected as a [`FederatedFlow`]. Adapters hand it a
//! [`FederatedRequest`] and exchange the returned credential for an identity.

use std::collections::BTreeMap;
use std::fmt::Write;

use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

use super::{ProviderError, codes};

const GOOGLE_PROVIDER_ID: &str = "google.com";
const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Parameters for one interactive federated sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedRequest {
    /// Provider identifier, e.g. `google.com`.
    pub provider_id: String,
    pub client_id: Option<String>,
    pub redirect_uri: String,
    /// Extra query parameters for the provider (e.g. `prompt=select_account`).
    pub custom_parameters: BTreeMap<String, String>,
    /// Random per-attempt value echoed back inside the IdP token.
    pub nonce: String,
}

impl FederatedRequest {
    #[must_use]
    pub fn new(provider_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            client_id: None,
            redirect_uri: redirect_uri.into(),
            custom_parameters: BTreeMap::new(),
            nonce: generate_nonce(),
        }
    }

    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(key.into(), value.into());
        self
    }

    /// Browser URL that starts the flow. `None` for providers without a known
    /// authorization endpoint or when no client id is configured.
    #[must_use]
    pub fn authorization_url(&self) -> Option<String> {
        if self.provider_id != GOOGLE_PROVIDER_ID {
            return None;
        }
        let client_id = self.client_id.as_deref()?;
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", client_id),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "id_token"),
            ("scope", "openid email profile"),
            ("nonce", self.nonce.as_str()),
        ];
        params.extend(self.custom_parameters.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        reqwest::Url::parse_with_params(GOOGLE_AUTHORIZE_URL, &params)
            .ok()
            .map(String::from)
    }
}

/// Generate a random 16-byte hex nonce.
#[must_use]
pub(crate) fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Credential returned by the IdP at the end of the interactive step.
#[derive(Clone, PartialEq, Eq)]
pub struct FederatedCredential {
    pub id_token: String,
}

impl std::fmt::Debug for FederatedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCredential").field("id_token", &"<redacted>").finish()
    }
}

/// Interactive step of a federated sign-in.
#[async_trait::async_trait]
pub trait FederatedFlow: Send + Sync {
    /// Drive the user through the IdP and return its credential.
    ///
    /// # Errors
    ///
    /// Returns `auth/popup-closed-by-user` when the user abandons the flow and
    /// `auth/popup-blocked` when the flow cannot be shown at all.
    async fn authorize(&self, request: &FederatedRequest) -> Result<FederatedCredential, ProviderError>;
}

// =============================================================================
// CONSOLE FLOW
// =============================================================================

/// Terminal flow: prints the authorization URL and reads the resulting ID
/// token from a line of input. An empty line means the user gave up.
pub struct ConsoleFederatedFlow<R> {
    input: Mutex<R>,
}

impl ConsoleFederatedFlow<BufReader<Stdin>> {
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleFederatedFlow<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self { input: Mutex::new(input) }
    }
}

#[async_trait::async_trait]
impl<R> FederatedFlow for ConsoleFederatedFlow<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn authorize(&self, request: &FederatedRequest) -> Result<FederatedCredential, ProviderError> {
        let Some(url) = request.authorization_url() else {
            return Err(ProviderError::new(
                codes::POPUP_BLOCKED,
                format!("cannot open a sign-in window for {} without a client id", request.provider_id),
            ));
        };
        eprintln!("Open this URL to continue with {}:\n  {url}", request.provider_id);
        eprintln!("Paste the returned id_token (empty line to cancel):");

        let mut line = String::new();
        let read = self
            .input
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| ProviderError::internal(format!("reading id_token failed: {e}")))?;
        let token = line.trim();
        if read == 0 || token.is_empty() {
            return Err(ProviderError::new(codes::POPUP_CLOSED_BY_USER, "the sign-in prompt was closed"));
        }
        Ok(FederatedCredential { id_token: token.to_owned() })
    }
}

#[cfg(test)]
#[path = "federated_test.rs"]
mod tests;
