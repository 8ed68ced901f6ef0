//! Single-slot notification state consumed by a display collaborator.
//!
//! Holds at most one pending message: a new push overwrites whatever was
//! there (last write wins, no queuing). The display collaborator reads and
//! clears in one step via [`Noticeboard::take`].

use std::sync::{Arc, Mutex};

/// Shared single-slot message board. Clone-friendly via `Arc`.
#[derive(Clone, Default)]
pub struct Noticeboard {
    slot: Arc<Mutex<Option<String>>>,
}

impl Noticeboard {
    /// Create an empty noticeboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending message unconditionally.
    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "notification pushed");
        *self.slot.lock().unwrap() = Some(message);
    }

    /// Read and clear the pending message.
    pub fn take(&self) -> Option<String> {
        self.slot.lock().unwrap().take()
    }

    /// Peek at the pending message without clearing it.
    pub fn current(&self) -> Option<String> {
        self.slot.lock().unwrap().clone()
    }

    /// Drop the pending message, if any.
    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }
}
