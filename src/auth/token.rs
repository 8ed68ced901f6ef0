//! TokenStore - the process-wide credential slot.

use std::sync::Arc;

use tokio::sync::watch;

/// Holds the current bearer token, if any.
///
/// At most one credential is live: `set` fully replaces the old one and
/// `clear` is the only transition back to the unauthenticated state. The
/// store is observable through [`TokenStore::subscribe`] so dependents (the
/// request pipeline, the auth gate) react to changes without polling.
///
/// No network or storage side effects live here; persistence across process
/// restarts is an external concern.
#[derive(Clone)]
pub struct TokenStore {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Create an unauthenticated store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the live credential.
    pub fn set(&self, token: impl Into<String>) {
        self.tx.send_replace(Some(token.into()));
    }

    /// Drop the live credential, returning to the unauthenticated state.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// The current credential, if present.
    pub fn get(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Whether a credential is currently live.
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Observe credential changes. The receiver sees the value current at
    /// subscription time and every replacement after it.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}
