//! In-process identity provider.
//!
//! Behaves like the hosted provider for everything the façade can observe:
//! account creation, password checks with lockout, disabled accounts,
//! profile edits, token revocation and password-reset mail (kept in an
//! outbox). Failures can be injected per operation and the push channel can
//! be broken on demand, which is what the façade tests lean on.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::listeners::{ListenerSet, Subscription};
use super::{Identity, IdentityProvider, ProfileUpdate, ProviderError, codes};
use crate::auth::credentials::is_well_formed_email;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Provider call that an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Subscribe,
    CreateAccount,
    SignIn,
    Federated,
    SignOut,
    PasswordReset,
    UpdateProfile,
    Reload,
}

/// Profile the scripted federated flow signs in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    disabled: bool,
    failed_attempts: u32,
    token_generation: u64,
}

impl Account {
    fn token(&self) -> String {
        format!("mem.{}.{}", self.uid, self.token_generation)
    }

    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            id_token: self.token(),
            email: Some(self.email.clone()),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

#[derive(Default)]
struct Directory {
    accounts: HashMap<String, Account>,
    outbox: Vec<String>,
    failures: HashMap<Operation, VecDeque<ProviderError>>,
    federated: VecDeque<Result<FederatedProfile, ProviderError>>,
}

impl Directory {
    fn take_failure(&mut self, op: Operation) -> Result<(), ProviderError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn by_uid_mut(&mut self, uid: &str) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.uid == uid)
    }
}

/// In-memory [`IdentityProvider`].
pub struct InMemoryIdentityProvider {
    listeners: ListenerSet,
    directory: Mutex<Directory>,
}

impl InMemoryIdentityProvider {
    /// Provider that reports its (signed-out) state to subscribers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self { listeners: ListenerSet::new(), directory: Mutex::new(Directory::default()) }
    }

    /// Provider that stays silent until [`InMemoryIdentityProvider::initialize`],
    /// like a hosted SDK still restoring its persisted state.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self { listeners: ListenerSet::uninitialized(), directory: Mutex::new(Directory::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn initialize(&self) {
        self.listeners.initialize();
    }

    /// Register an email/password account without signing it in.
    pub fn add_account(&self, email: &str, password: &str, display_name: Option<&str>) -> Identity {
        let account = Account {
            uid: Uuid::new_v4().to_string(),
            email: email.to_ascii_lowercase(),
            password: Some(password.to_owned()),
            display_name: display_name.map(str::to_owned),
            photo_url: None,
            disabled: false,
            failed_attempts: 0,
            token_generation: 0,
        };
        let identity = account.identity();
        self.lock().accounts.insert(account.email.clone(), account);
        identity
    }

    pub fn disable_account(&self, email: &str) {
        if let Some(account) = self.lock().accounts.get_mut(&email.to_ascii_lowercase()) {
            account.disabled = true;
        }
    }

    /// Change a display name out-of-band (another device, admin console).
    /// Subscribers are not notified, matching the hosted provider.
    pub fn rename_externally(&self, email: &str, display_name: &str) {
        if let Some(account) = self.lock().accounts.get_mut(&email.to_ascii_lowercase()) {
            account.display_name = Some(display_name.to_owned());
        }
    }

    /// Invalidate every token issued so far for `email`.
    pub fn revoke_tokens(&self, email: &str) {
        if let Some(account) = self.lock().accounts.get_mut(&email.to_ascii_lowercase()) {
            account.token_generation += 1;
        }
    }

    /// Make the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: Operation, code: &str, message: &str) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(ProviderError::new(code, message));
    }

    /// Queue the outcome of the next federated sign-in.
    pub fn queue_federated(&self, outcome: Result<FederatedProfile, ProviderError>) {
        self.lock().federated.push_back(outcome);
    }

    /// Break every open subscription, as a dropped push connection would.
    pub fn break_subscriptions(&self, code: &str, message: &str) {
        self.listeners.fail_all(&ProviderError::new(code, message));
    }

    /// Re-deliver the current identity to subscribers (token refresh).
    pub fn refresh_token(&self) {
        self.listeners.set_current(self.listeners.current());
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.listeners.current()
    }

    #[must_use]
    pub fn password_reset_outbox(&self) -> Vec<String> {
        self.lock().outbox.clone()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.listener_count()
    }

    fn sign_in_as(&self, identity: Identity) -> Identity {
        self.listeners.set_current(Some(identity.clone()));
        identity
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn check_email(email: &str) -> Result<String, ProviderError> {
    if is_well_formed_email(email) {
        Ok(email.to_ascii_lowercase())
    } else {
        Err(ProviderError::new(codes::INVALID_EMAIL, "The email address is badly formatted."))
    }
}

fn user_not_found() -> ProviderError {
    ProviderError::new(codes::USER_NOT_FOUND, "There is no user record corresponding to this identifier.")
}

fn user_disabled() -> ProviderError {
    ProviderError::new(codes::USER_DISABLED, "The user account has been disabled by an administrator.")
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn subscribe(&self) -> Result<Subscription, ProviderError> {
        self.lock().take_failure(Operation::Subscribe)?;
        Ok(self.listeners.subscribe())
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let identity = {
            let mut dir = self.lock();
            dir.take_failure(Operation::CreateAccount)?;
            let email = check_email(email)?;
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(ProviderError::new(
                    codes::WEAK_PASSWORD,
                    "Password should be at least 6 characters",
                ));
            }
            if dir.accounts.contains_key(&email) {
                return Err(ProviderError::new(
                    codes::EMAIL_IN_USE,
                    "The email address is already in use by another account.",
                ));
            }
            let account = Account {
                uid: Uuid::new_v4().to_string(),
                email: email.clone(),
                password: Some(password.to_owned()),
                display_name: None,
                photo_url: None,
                disabled: false,
                failed_attempts: 0,
                token_generation: 0,
            };
            let identity = account.identity();
            dir.accounts.insert(email, account);
            identity
        };
        Ok(self.sign_in_as(identity))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let identity = {
            let mut dir = self.lock();
            dir.take_failure(Operation::SignIn)?;
            let email = check_email(email)?;
            let account = dir.accounts.get_mut(&email).ok_or_else(user_not_found)?;
            if account.disabled {
                return Err(user_disabled());
            }
            if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
                return Err(ProviderError::new(
                    codes::TOO_MANY_REQUESTS,
                    "Access to this account has been temporarily disabled due to many failed login attempts.",
                ));
            }
            if account.password.as_deref() != Some(password) {
                account.failed_attempts += 1;
                return Err(ProviderError::new(
                    codes::WRONG_PASSWORD,
                    "The password is invalid or the user does not have a password.",
                ));
            }
            account.failed_attempts = 0;
            account.identity()
        };
        Ok(self.sign_in_as(identity))
    }

    async fn sign_in_with_federated(&self) -> Result<Identity, ProviderError> {
        let identity = {
            let mut dir = self.lock();
            dir.take_failure(Operation::Federated)?;
            let profile = dir.federated.pop_front().unwrap_or_else(|| {
                Err(ProviderError::new(codes::POPUP_CLOSED_BY_USER, "The popup has been closed by the user."))
            })?;
            let email = profile.email.to_ascii_lowercase();
            let account = dir.accounts.entry(email.clone()).or_insert_with(|| Account {
                uid: Uuid::new_v4().to_string(),
                email,
                password: None,
                display_name: profile.display_name.clone(),
                photo_url: profile.photo_url.clone(),
                disabled: false,
                failed_attempts: 0,
                token_generation: 0,
            });
            if account.disabled {
                return Err(user_disabled());
            }
            account.identity()
        };
        Ok(self.sign_in_as(identity))
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.lock().take_failure(Operation::SignOut)?;
        self.listeners.set_current(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let mut dir = self.lock();
        dir.take_failure(Operation::PasswordReset)?;
        let email = check_email(email)?;
        if !dir.accounts.contains_key(&email) {
            return Err(user_not_found());
        }
        dir.outbox.push(email);
        Ok(())
    }

    async fn update_profile(&self, identity: &Identity, update: &ProfileUpdate) -> Result<(), ProviderError> {
        let updated = {
            let mut dir = self.lock();
            dir.take_failure(Operation::UpdateProfile)?;
            let account = dir.by_uid_mut(&identity.uid).ok_or_else(user_not_found)?;
            if account.disabled {
                return Err(user_disabled());
            }
            if account.token() != identity.id_token {
                return Err(ProviderError::new(codes::USER_TOKEN_EXPIRED, "The user's credential is no longer valid."));
            }
            if let Some(name) = &update.display_name {
                account.display_name = Some(name.clone());
            }
            if let Some(url) = &update.photo_url {
                account.photo_url = Some(url.clone());
            }
            account.identity()
        };
        if self.listeners.is_current(&updated.uid) {
            self.listeners.set_current(Some(updated));
        }
        Ok(())
    }

    async fn reload(&self, identity: &Identity) -> Result<Identity, ProviderError> {
        let fresh = {
            let mut dir = self.lock();
            dir.take_failure(Operation::Reload)?;
            let account = dir.by_uid_mut(&identity.uid).ok_or_else(user_not_found)?;
            if account.disabled {
                return Err(user_disabled());
            }
            if account.token() != identity.id_token {
                return Err(ProviderError::new(codes::USER_TOKEN_EXPIRED, "The user's credential is no longer valid."));
            }
            account.identity()
        };
        self.listeners.refresh_current(&fresh);
        Ok(fresh)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
