//! Live state shared between the session's event loop and its callers.
//!
//! [`LiveState`] is wrapped in `Arc<Mutex<>>`. The lock is only held for a
//! single cache or presence operation, never across an await point.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use airops_cache::{PresenceTracker, QueryCache};

pub struct LiveState {
    /// Results of REST fetches, kept consistent with socket events.
    pub cache: QueryCache,

    /// Typing and online sets. Cleared on every disconnect.
    pub presence: PresenceTracker,
}

impl LiveState {
    pub fn new(preview_chars: usize, typing_expiry: Option<Duration>) -> Self {
        Self {
            cache: QueryCache::new(preview_chars),
            presence: PresenceTracker::new(typing_expiry),
        }
    }
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            cache: QueryCache::default(),
            presence: PresenceTracker::default(),
        }
    }
}

pub type SharedState = Arc<Mutex<LiveState>>;

/// Lock the state, recovering from a poisoned lock; the cache is plain
/// data and stays consistent between operations.
pub fn lock(state: &Mutex<LiveState>) -> MutexGuard<'_, LiveState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
