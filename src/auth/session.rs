//! Session snapshot types published by the façade.

use std::fmt;

use serde::Serialize;

use crate::provider::Identity;

/// Opaque bearer token. Never logged, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct IdToken(String);

impl IdToken {
    /// Raw token for attaching to outbound requests.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdToken(<redacted>)")
    }
}

/// An authenticated user as consumers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    uid: String,
    #[serde(skip)]
    token: IdToken,
    display_name: Option<String>,
    avatar_url: Option<String>,
    email: Option<String>,
}

impl Session {
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[must_use]
    pub fn token(&self) -> &IdToken {
        &self.token
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

impl From<Identity> for Session {
    fn from(identity: Identity) -> Self {
        Self {
            uid: identity.uid,
            token: IdToken(identity.id_token),
            display_name: identity.display_name,
            avatar_url: identity.photo_url,
            email: identity.email,
        }
    }
}

/// Condition of the push subscription behind the session value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubscriptionHealth {
    Live,
    /// Channel broke; re-subscribe attempt `attempt` is pending.
    Reconnecting { attempt: u32 },
    /// Retries exhausted. The session is reported absent from here on.
    Lost,
}

/// Everything a consumer needs to render auth-dependent UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pending: bool,
    session: Option<Session>,
    health: SubscriptionHealth,
}

impl SessionState {
    /// State before the provider has said anything.
    pub(crate) fn initial() -> Self {
        Self { pending: true, session: None, health: SubscriptionHealth::Live }
    }

    /// `true` until the first subscription value arrives. No session value is
    /// authoritative while pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn health(&self) -> SubscriptionHealth {
        self.health
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    /// Publish a delivered value. Clears the pending gate for good.
    pub(crate) fn settle(&mut self, session: Option<Session>) {
        self.pending = false;
        self.session = session;
        self.health = SubscriptionHealth::Live;
    }

    pub(crate) fn reconnecting(&mut self, attempt: u32) {
        self.health = SubscriptionHealth::Reconnecting { attempt };
    }

    pub(crate) fn mark_lost(&mut self) {
        self.pending = false;
        self.session = None;
        self.health = SubscriptionHealth::Lost;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
