//! Credential input and client-side validation.
//!
//! These checks run before any provider call so obviously bad input never
//! costs a round trip. Registration rules are evaluated in a fixed order and
//! the first failure wins, which keeps the message shown to the user stable.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

const MIN_PASSWORD_LEN: usize = 8;
const MIN_DISPLAY_NAME_LEN: usize = 3;
const PASSWORD_SPECIALS: &str = "!@#$%^&*";

// `None` only if the pattern fails to compile.
static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// `true` for `local@domain.tld`-shaped addresses.
#[must_use]
pub fn is_well_formed_email(email: &str) -> bool {
    EMAIL_PATTERN.as_ref().is_some_and(|re| re.is_match(email))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Please enter both email and password")]
    MissingCredentials,
    #[error("Please enter your email first")]
    MissingEmail,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least 8 characters long")]
    PasswordTooShort,
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must contain at least one number")]
    MissingDigit,
    #[error("Password must contain at least one special character (!@#$%^&*)")]
    MissingSpecial,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Display name must be at least 3 characters long")]
    DisplayNameTooShort,
    #[error("You must accept the terms and conditions")]
    TermsNotAccepted,
}

/// Email + password pair from a sign-in form.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }

    /// # Errors
    ///
    /// [`CredentialError::MissingCredentials`] when either field is empty.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(CredentialError::MissingCredentials);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration form.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub display_name: String,
    pub terms_accepted: bool,
}

impl Registration {
    /// Apply the registration rules in order.
    ///
    /// # Errors
    ///
    /// Returns the first rule that fails.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if !is_well_formed_email(&self.email) {
            return Err(CredentialError::InvalidEmail);
        }
        check_password_strength(&self.password)?;
        if self.password != self.confirm_password {
            return Err(CredentialError::PasswordMismatch);
        }
        if self.display_name.chars().count() < MIN_DISPLAY_NAME_LEN {
            return Err(CredentialError::DisplayNameTooShort);
        }
        if !self.terms_accepted {
            return Err(CredentialError::TermsNotAccepted);
        }
        Ok(())
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("confirm_password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("terms_accepted", &self.terms_accepted)
            .finish()
    }
}

fn check_password_strength(password: &str) -> Result<(), CredentialError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooShort);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(CredentialError::MissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(CredentialError::MissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(CredentialError::MissingDigit);
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(CredentialError::MissingSpecial);
    }
    Ok(())
}

/// Check the email typed before asking for a password reset.
///
/// # Errors
///
/// [`CredentialError::MissingEmail`] when the field is empty.
pub fn validate_reset_email(email: &str) -> Result<(), CredentialError> {
    if email.is_empty() {
        return Err(CredentialError::MissingEmail);
    }
    Ok(())
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
