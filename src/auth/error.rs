//! Normalized authentication errors.
//!
//! DESIGN
//! ======
//! Providers report free-form codes; consumers get one of a fixed set of
//! [`AuthErrorKind`]s with a stable, displayable message. The mapping is a
//! pure function of the code and total: anything unrecognized is `Unknown`.
//! The provider's own text is kept for diagnostics but never displayed; hosted
//! services answer with bare server tokens that are not fit for users.

use serde::Serialize;

use crate::provider::{ProviderError, codes};

const UNKNOWN_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again";

/// Provider-independent classification of an auth failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuthErrorKind {
    InvalidEmail,
    EmailInUse,
    WeakPassword,
    UserDisabled,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    PopupBlocked,
    PopupClosedByUser,
    CancelledRequest,
    /// Sign-up created the account but the display name could not be saved.
    ProfileUpdateFailed,
    Unknown,
}

impl AuthErrorKind {
    /// Classify a provider code. Total: unrecognized codes are `Unknown`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            codes::INVALID_EMAIL => Self::InvalidEmail,
            codes::EMAIL_IN_USE => Self::EmailInUse,
            codes::WEAK_PASSWORD => Self::WeakPassword,
            codes::USER_DISABLED => Self::UserDisabled,
            codes::USER_NOT_FOUND => Self::UserNotFound,
            codes::WRONG_PASSWORD => Self::WrongPassword,
            codes::TOO_MANY_REQUESTS => Self::TooManyRequests,
            codes::POPUP_BLOCKED => Self::PopupBlocked,
            codes::POPUP_CLOSED_BY_USER => Self::PopupClosedByUser,
            codes::CANCELLED_POPUP_REQUEST => Self::CancelledRequest,
            _ => Self::Unknown,
        }
    }

    /// Fixed user-facing message.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidEmail => "Invalid email address",
            Self::EmailInUse => "An account already exists with this email",
            Self::WeakPassword => "Password is too weak",
            Self::UserDisabled => "This account has been disabled",
            Self::UserNotFound => "No account found with this email",
            Self::WrongPassword => "Incorrect password",
            Self::TooManyRequests => "Too many failed attempts. Please try again later",
            Self::PopupBlocked => "Please allow popups for this site to sign in",
            Self::PopupClosedByUser => "Sign in was cancelled",
            Self::CancelledRequest => "Please try signing in again",
            Self::ProfileUpdateFailed => "Your account was created, but your display name could not be saved",
            Self::Unknown => UNKNOWN_FALLBACK_MESSAGE,
        }
    }

    /// Grepable code for logs.
    #[must_use]
    pub fn error_code(self) -> &'static str {
        match self {
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::EmailInUse => "E_EMAIL_IN_USE",
            Self::WeakPassword => "E_WEAK_PASSWORD",
            Self::UserDisabled => "E_USER_DISABLED",
            Self::UserNotFound => "E_USER_NOT_FOUND",
            Self::WrongPassword => "E_WRONG_PASSWORD",
            Self::TooManyRequests => "E_TOO_MANY_REQUESTS",
            Self::PopupBlocked => "E_POPUP_BLOCKED",
            Self::PopupClosedByUser => "E_POPUP_CLOSED_BY_USER",
            Self::CancelledRequest => "E_CANCELLED_REQUEST",
            Self::ProfileUpdateFailed => "E_PROFILE_UPDATE_FAILED",
            Self::Unknown => "E_UNKNOWN",
        }
    }

    /// Whether repeating the same call later can succeed without user changes.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(self, Self::TooManyRequests | Self::CancelledRequest)
    }
}

/// Failure surfaced by a session façade operation.
///
/// `Display` is always the fixed message of the kind. The provider's own text
/// never reaches the user and is kept in [`AuthError::diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .kind.message())]
pub struct AuthError {
    kind: AuthErrorKind,
    diagnostic: String,
    provider_code: Option<String>,
}

impl AuthError {
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    /// Displayable message. Never blank.
    #[must_use]
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    /// Provider text for logs and bug reports. Falls back to the provider code,
    /// then to the display message, so it is never blank either.
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }

    /// Original provider code, when the error came from the provider.
    #[must_use]
    pub fn provider_code(&self) -> Option<&str> {
        self.provider_code.as_deref()
    }

    /// Sign-up succeeded but the follow-up profile update did not.
    #[must_use]
    pub fn profile_update_failed(err: ProviderError) -> Self {
        Self::with_kind(AuthErrorKind::ProfileUpdateFailed, err)
    }

    fn with_kind(kind: AuthErrorKind, err: ProviderError) -> Self {
        let diagnostic = [err.message.trim(), err.code.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
            .unwrap_or(kind.message())
            .to_owned();
        Self { kind, diagnostic, provider_code: Some(err.code) }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        Self::with_kind(AuthErrorKind::from_code(&err.code), err)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
