//! Identity provider boundary.
//!
//! ARCHITECTURE
//! ============
//! The session façade only ever sees [`IdentityProvider`]: a push-style
//! subscription plus a handful of async account calls that answer with a
//! value or a coded [`ProviderError`]. Adapters own the wire protocol and
//! translate their own failures into the canonical `auth/*` codes in
//! [`codes`], so the façade's error table never depends on a transport.
//!
//! EMISSION CONTRACT
//! =================
//! Adapters notify subscribers after sign-up, sign-in (both kinds), sign-out
//! and any profile update of the current identity. `reload` never notifies:
//! the façade reloads every identity it receives, so a notifying reload
//! would feed back into itself.

pub mod federated;
pub mod listeners;
pub mod memory;
pub mod rest;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use federated::{ConsoleFederatedFlow, FederatedCredential, FederatedFlow, FederatedRequest};
pub use listeners::{AuthEvent, ListenerSet, Subscription};
pub use memory::InMemoryIdentityProvider;
pub use rest::RestIdentityProvider;

// =============================================================================
// CODES
// =============================================================================

/// Canonical provider error codes.
pub mod codes {
    pub const EMAIL_IN_USE: &str = "auth/email-already-in-use";
    pub const INVALID_EMAIL: &str = "auth/invalid-email";
    pub const WEAK_PASSWORD: &str = "auth/weak-password";
    pub const USER_DISABLED: &str = "auth/user-disabled";
    pub const USER_NOT_FOUND: &str = "auth/user-not-found";
    pub const WRONG_PASSWORD: &str = "auth/wrong-password";
    pub const TOO_MANY_REQUESTS: &str = "auth/too-many-requests";
    pub const POPUP_BLOCKED: &str = "auth/popup-blocked";
    pub const POPUP_CLOSED_BY_USER: &str = "auth/popup-closed-by-user";
    pub const CANCELLED_POPUP_REQUEST: &str = "auth/cancelled-popup-request";
    pub const INVALID_CREDENTIAL: &str = "auth/invalid-credential";
    pub const USER_TOKEN_EXPIRED: &str = "auth/user-token-expired";
    pub const INVALID_USER_TOKEN: &str = "auth/invalid-user-token";
    pub const REQUIRES_RECENT_LOGIN: &str = "auth/requires-recent-login";
    pub const OPERATION_NOT_ALLOWED: &str = "auth/operation-not-allowed";
    pub const OPERATION_NOT_SUPPORTED: &str = "auth/operation-not-supported-in-this-environment";
    pub const NETWORK_REQUEST_FAILED: &str = "auth/network-request-failed";
    pub const INTERNAL_ERROR: &str = "auth/internal-error";
}

// =============================================================================
// ERROR
// =============================================================================

/// A coded failure reported by an identity provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Canonical `auth/*` code (see [`codes`]) or an adapter-specific one.
    pub code: String,
    /// Provider's own diagnostic text.
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    /// Transport-level failure (connect, timeout, TLS).
    #[must_use]
    pub fn network(err: impl fmt::Display) -> Self {
        Self::new(codes::NETWORK_REQUEST_FAILED, err.to_string())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// `true` when the provider no longer recognizes the identity at all.
    #[must_use]
    pub fn invalidates_identity(&self) -> bool {
        matches!(
            self.code.as_str(),
            codes::USER_TOKEN_EXPIRED | codes::INVALID_USER_TOKEN | codes::USER_DISABLED | codes::USER_NOT_FOUND
        )
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Provider-side view of a signed-in account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable provider user id.
    pub uid: String,
    /// Opaque bearer token. Never inspected outside the adapter that minted it.
    pub id_token: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    /// Copy of this identity with `update` applied.
    #[must_use]
    pub fn with_profile(&self, update: &ProfileUpdate) -> Self {
        let mut next = self.clone();
        if let Some(name) = &update.display_name {
            next.display_name = Some(name.clone());
        }
        if let Some(url) = &update.photo_url {
            next.photo_url = Some(url.clone());
        }
        next
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("id_token", &"<redacted>")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("photo_url", &self.photo_url)
            .finish()
    }
}

/// Profile fields to change. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn display_name(name: impl Into<String>) -> Self {
        Self { display_name: Some(name.into()), photo_url: None }
    }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// Capability set of an external identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Open a session-change subscription. The current identity (or its
    /// absence) is delivered first once the provider has initialized.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the push channel cannot be opened.
    fn subscribe(&self) -> Result<Subscription, ProviderError>;

    /// Create an email/password account and sign it in.
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;

    /// Run the provider's interactive federated flow and sign in with its result.
    async fn sign_in_with_federated(&self) -> Result<Identity, ProviderError>;

    /// Sign the current identity out.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Ask the provider to send a password-reset email.
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    /// Change profile fields of `identity`.
    async fn update_profile(&self, identity: &Identity, update: &ProfileUpdate) -> Result<(), ProviderError>;

    /// Fetch a fresh copy of `identity` from the provider. Must not notify subscribers.
    async fn reload(&self, identity: &Identity) -> Result<Identity, ProviderError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
