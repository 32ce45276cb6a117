//! One-shot status messages shown on the next index render.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct FlashMessages {
    pending: Mutex<Vec<String>>,
}

impl FlashMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    /// Returns and clears every pending message, oldest first.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
