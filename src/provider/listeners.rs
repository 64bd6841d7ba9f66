//! Listener registry shared by provider adapters.
//!
//! DESIGN
//! ======
//! Every subscriber owns an unbounded channel keyed by a random id, the same
//! shape as a board's connected-client map. The registry remembers the current
//! identity so a late subscriber receives it first. Dropping a
//! [`Subscription`] removes its entry, so a listener can never outlive the
//! scope that opened it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Identity, ProviderError};

/// One notification on the session-change channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The signed-in identity changed (`None` = signed out).
    Changed(Option<Identity>),
    /// The push channel broke. No further events follow on this subscription.
    Failed(ProviderError),
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live session-change subscription. Unsubscribes when dropped.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<AuthEvent>,
    _guard: Unsubscribe,
}

impl Subscription {
    /// Wrap a receiver; `on_drop` runs exactly once when the subscription goes away.
    pub fn new(events: mpsc::UnboundedReceiver<AuthEvent>, on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self { events, _guard: Unsubscribe(Some(Box::new(on_drop))) }
    }

    /// Next event, or `None` once the provider side has closed the channel.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        self.events.recv().await
    }

    /// Explicitly release the subscription.
    pub fn unsubscribe(self) {}
}

struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

// =============================================================================
// LISTENER SET
// =============================================================================

struct Registry {
    current: Option<Identity>,
    initialized: bool,
    listeners: HashMap<Uuid, mpsc::UnboundedSender<AuthEvent>>,
}

impl Registry {
    fn broadcast(&mut self, event: &AuthEvent) {
        self.listeners.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

/// Current identity plus the set of subscribers waiting for changes to it.
#[derive(Clone)]
pub struct ListenerSet {
    inner: Arc<Mutex<Registry>>,
}

impl ListenerSet {
    /// Registry that delivers the current value to subscribers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initialized(true)
    }

    /// Registry that holds back all deliveries until [`ListenerSet::initialize`].
    #[must_use]
    pub fn uninitialized() -> Self {
        Self::with_initialized(false)
    }

    fn with_initialized(initialized: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry { current: None, initialized, listeners: HashMap::new() })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.inner)
    }

    /// Register a subscriber.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        {
            let mut registry = self.lock();
            if registry.initialized {
                let _ = tx.send(AuthEvent::Changed(registry.current.clone()));
            }
            registry.listeners.insert(id, tx);
        }
        let registry: Weak<Mutex<Registry>> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = registry.upgrade() {
                lock_registry(&inner).listeners.remove(&id);
            }
        })
    }

    /// Mark the provider initialized and deliver the current value to everyone
    /// already waiting. No-op when already initialized.
    pub fn initialize(&self) {
        let mut registry = self.lock();
        if registry.initialized {
            return;
        }
        registry.initialized = true;
        let event = AuthEvent::Changed(registry.current.clone());
        registry.broadcast(&event);
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    /// Replace the current identity and notify subscribers.
    pub fn set_current(&self, identity: Option<Identity>) {
        let mut registry = self.lock();
        registry.current = identity;
        if registry.initialized {
            let event = AuthEvent::Changed(registry.current.clone());
            registry.broadcast(&event);
        }
    }

    /// Replace the current identity without notifying (used by reload).
    /// Only applies when `identity` is the one currently signed in.
    pub fn refresh_current(&self, identity: &Identity) {
        let mut registry = self.lock();
        if registry.current.as_ref().is_some_and(|current| current.uid == identity.uid) {
            registry.current = Some(identity.clone());
        }
    }

    /// `true` when `uid` is the signed-in identity.
    #[must_use]
    pub fn is_current(&self, uid: &str) -> bool {
        self.lock().current.as_ref().is_some_and(|current| current.uid == uid)
    }

    /// Break every open subscription with `err`.
    pub fn fail_all(&self, err: &ProviderError) {
        let mut registry = self.lock();
        for (_, tx) in registry.listeners.drain() {
            let _ = tx.send(AuthEvent::Failed(err.clone()));
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_registry(inner: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "listeners_test.rs"]
mod tests;
