//! Client-side authentication session for the movie browser.
//!
//! [`auth::SessionFacade`] turns an identity provider's push notifications
//! into one observable session value and exposes sign-up, sign-in,
//! federated sign-in, sign-out and password reset with normalized errors.
//! Providers plug in through [`provider::IdentityProvider`]; the crate ships
//! a REST adapter and an in-memory one.

pub mod auth;
pub mod config;
pub mod provider;

pub use auth::{AuthError, AuthErrorKind, Session, SessionFacade, SessionState};
pub use config::{IdentityConfig, SubscriptionPolicy};
pub use provider::{IdentityProvider, ProviderError};
