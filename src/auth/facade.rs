//! Session façade: one observable session value kept in sync with the
//! identity provider.
//!
//! ARCHITECTURE
//! ============
//! `SessionFacade::start` spawns a single listener task that owns the
//! provider subscription and is the only writer of the published
//! [`SessionState`]. Consumers read it through `watch` receivers. Account
//! operations (`sign_in`, `sign_up`, ...) call the provider directly and hand
//! the result back to the caller; they never write the published state and
//! rely on the provider re-emitting instead.
//!
//! ORDERING
//! ========
//! Events are drained one at a time. Each signed-in identity is reloaded
//! before it is published, and the next event is not read until that reload
//! finishes, so the published value always belongs to the last event
//! delivered. Overlapping operations are neither serialized nor merged.
//!
//! ERROR HANDLING
//! ==============
//! Provider failures become [`AuthError`]s through one total code table.
//! A broken subscription is retried with capped exponential backoff; once
//! retries run out the state goes `Lost` with no session, so a stale
//! identity is never left on screen.
//!
//! TEARDOWN
//! ========
//! The subscription lives inside the listener task. `shutdown` and `Drop`
//! abort that task, which drops the subscription and unregisters it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::error::AuthError;
use super::session::{Session, SessionState};
use crate::config::SubscriptionPolicy;
use crate::provider::{AuthEvent, Identity, IdentityProvider, ProfileUpdate, ProviderError, Subscription};

pub struct SessionFacade {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Receiver<SessionState>,
    listener: Option<JoinHandle<()>>,
}

impl SessionFacade {
    /// Subscribe to `provider` and start publishing session state.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(provider: Arc<dyn IdentityProvider>, policy: SubscriptionPolicy) -> Self {
        let (tx, rx) = watch::channel(SessionState::initial());
        let listener = tokio::spawn(run_listener(Arc::clone(&provider), policy, tx));
        Self { provider, state: rx, listener: Some(listener) }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Snapshot of the published state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Current session, if any. Not authoritative while pending.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.borrow().is_pending()
    }

    /// Read-only receiver for change notifications.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the first subscription value.
    pub async fn settled(&self) -> SessionState {
        self.wait_until(|state| !state.is_pending()).await
    }

    /// Wait until the published state satisfies `pred`.
    ///
    /// Returns the last published state instead if the listener has stopped
    /// and the predicate can no longer become true.
    pub async fn wait_until(&self, pred: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(pred).await.map(|state| SessionState::clone(&state));
        reached.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Like [`SessionFacade::wait_until`] but gives up after `limit`.
    ///
    /// `None` means the predicate did not hold in time, e.g. because the
    /// identity was invalidated on reload and published as signed out.
    pub async fn wait_until_within(
        &self,
        limit: Duration,
        pred: impl FnMut(&SessionState) -> bool,
    ) -> Option<SessionState> {
        tokio::time::timeout(limit, self.wait_until(pred)).await.ok()
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Create an account and set its display name.
    ///
    /// A blank `display_name` skips the profile update.
    ///
    /// # Errors
    ///
    /// Normalized provider failure. If the account was created but the display
    /// name could not be saved the kind is `ProfileUpdateFailed`; the new
    /// account stays signed in.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Session, AuthError> {
        let identity = self
            .provider
            .create_account(email, password)
            .await
            .map_err(|e| rejected("sign-up", e))?;
        info!(uid = %identity.uid, "session: account created");

        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Ok(identity.into());
        }
        let update = ProfileUpdate::display_name(display_name);
        if let Err(e) = self.provider.update_profile(&identity, &update).await {
            warn!(uid = %identity.uid, code = %e.code, "session: display name update failed after sign-up");
            return Err(AuthError::profile_update_failed(e));
        }
        Ok(identity.with_profile(&update).into())
    }

    /// # Errors
    ///
    /// Normalized provider failure.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let identity = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| rejected("sign-in", e))?;
        info!(uid = %identity.uid, "session: signed in");
        Ok(identity.into())
    }

    /// Sign in through the configured federated provider.
    ///
    /// # Errors
    ///
    /// Normalized provider failure (`PopupBlocked`, `PopupClosedByUser`,
    /// `CancelledRequest`, ...).
    pub async fn sign_in_with_federated_provider(&self) -> Result<Session, AuthError> {
        let identity = self
            .provider
            .sign_in_with_federated()
            .await
            .map_err(|e| rejected("federated sign-in", e))?;
        info!(uid = %identity.uid, "session: signed in (federated)");
        Ok(identity.into())
    }

    /// # Errors
    ///
    /// Normalized provider failure.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await.map_err(|e| rejected("sign-out", e))?;
        info!("session: signed out");
        Ok(())
    }

    /// # Errors
    ///
    /// Normalized provider failure, e.g. `InvalidEmail` or `UserNotFound`.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        self.provider
            .send_password_reset(email)
            .await
            .map_err(|e| rejected("password reset", e))?;
        info!("session: password reset requested");
        Ok(())
    }

    /// Stop listening and release the subscription.
    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn rejected(operation: &str, err: ProviderError) -> AuthError {
    let err = AuthError::from(err);
    warn!(
        operation,
        code = err.kind().error_code(),
        provider_code = err.provider_code().unwrap_or_default(),
        diagnostic = err.diagnostic(),
        "session: operation rejected"
    );
    err
}

// =============================================================================
// LISTENER TASK
// =============================================================================

async fn run_listener(
    provider: Arc<dyn IdentityProvider>,
    policy: SubscriptionPolicy,
    state: watch::Sender<SessionState>,
) {
    let mut attempt: u32 = 0;
    loop {
        match provider.subscribe() {
            Ok(mut subscription) => {
                match drain(provider.as_ref(), &mut subscription, &state, &mut attempt).await {
                    Some(e) => warn!(code = %e.code, message = %e.message, "session: subscription failed"),
                    None => warn!("session: subscription closed by provider"),
                }
            }
            Err(e) => warn!(code = %e.code, attempt, "session: subscribe failed"),
        }

        attempt += 1;
        if attempt > policy.max_retries {
            error!(retries = policy.max_retries, "session: subscription lost; reporting signed out");
            state.send_modify(SessionState::mark_lost);
            return;
        }
        state.send_modify(|s| s.reconnecting(attempt));
        tokio::time::sleep(policy.delay_for(attempt)).await;
    }
}

/// Publish events until the subscription ends. Returns the failure, or
/// `None` when the provider simply closed the channel.
async fn drain(
    provider: &dyn IdentityProvider,
    subscription: &mut Subscription,
    state: &watch::Sender<SessionState>,
    attempt: &mut u32,
) -> Option<ProviderError> {
    while let Some(event) = subscription.next().await {
        match event {
            AuthEvent::Changed(identity) => {
                let session = resolve(provider, identity).await;
                *attempt = 0;
                match &session {
                    Some(s) => info!(uid = %s.uid(), "session: published"),
                    None => info!("session: published signed out"),
                }
                state.send_modify(|s| s.settle(session));
            }
            AuthEvent::Failed(e) => return Some(e),
        }
    }
    None
}

/// Reload a delivered identity so the published profile is current.
async fn resolve(provider: &dyn IdentityProvider, identity: Option<Identity>) -> Option<Session> {
    let identity = identity?;
    match provider.reload(&identity).await {
        Ok(fresh) => Some(fresh.into()),
        Err(e) if e.invalidates_identity() => {
            warn!(uid = %identity.uid, code = %e.code, "session: identity no longer valid");
            None
        }
        Err(e) => {
            warn!(uid = %identity.uid, code = %e.code, "session: reload failed; publishing identity as delivered");
            Some(identity.into())
        }
    }
}

#[cfg(test)]
#[path = "facade_test.rs"]
mod tests;
