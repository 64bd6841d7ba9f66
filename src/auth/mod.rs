//! Session façade and the types it publishes.

pub mod credentials;
pub mod error;
pub mod facade;
pub mod session;

pub use credentials::{CredentialError, Credentials, Registration, is_well_formed_email, validate_reset_email};
pub use error::{AuthError, AuthErrorKind};
pub use facade::SessionFacade;
pub use session::{IdToken, Session, SessionState, SubscriptionHealth};
