//! Repeated-scan suppression for continuous capture streams.
//!
//! A physical barcode that stays in front of the camera is decoded on every
//! frame. [`DeduplicationWindow`] lets the first detection through and then
//! ignores the same payload until the cooldown has elapsed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cooldown used when none is configured.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Last-seen table keyed by decoded payload.
///
/// Entries are never evicted; the table lives as long as the process. Not
/// synchronized: callers that share it across tasks must hold a lock.
#[derive(Debug, Default)]
pub struct DeduplicationWindow {
    last_seen: HashMap<String, Instant>,
}

impl DeduplicationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `code` was never seen or was last seen more than
    /// `cooldown` before `now`, and records `now` as its last-seen time.
    ///
    /// Returns `false` without touching the recorded time otherwise.
    pub fn is_new(&mut self, code: &str, now: Instant, cooldown: Duration) -> bool {
        match self.last_seen.get_mut(code) {
            Some(seen) if now.saturating_duration_since(*seen) <= cooldown => false,
            Some(seen) => {
                *seen = now;
                true
            }
            None => {
                self.last_seen.insert(code.to_string(), now);
                true
            }
        }
    }

    /// Number of distinct payloads ever seen.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
