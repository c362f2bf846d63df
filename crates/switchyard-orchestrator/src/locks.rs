//! Per-key admission registry.
//!
//! The registry is the only resource shared across orchestrator instances.
//! A key is registered at admission and released only when its attempt
//! reaches a terminal state (the guard drops), which enforces the
//! one-active-deployment-per-key invariant. Registration is not re-entrant,
//! and a busy key is rejected, not queued — including keys currently
//! rolling back.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use switchyard_core::DeploymentKey;

/// Tracks which `(application, environment)` keys have an active attempt.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to register a key. Returns `None` if the key already has an
    /// active attempt; the returned guard releases the key on drop.
    pub fn acquire(&self, key: &DeploymentKey) -> Option<KeyGuard> {
        let name = key.to_string();
        let mut active = self.active.lock().expect("registry poisoned");
        if !active.insert(name.clone()) {
            return None;
        }
        debug!(key = %name, "key registered");
        Some(KeyGuard {
            key: name,
            active: Arc::clone(&self.active),
        })
    }

    /// Whether a key currently has an active attempt.
    pub fn is_active(&self, key: &DeploymentKey) -> bool {
        self.active
            .lock()
            .expect("registry poisoned")
            .contains(&key.to_string())
    }
}

/// Exclusive registration for one key, released on drop.
pub struct KeyGuard {
    key: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("registry poisoned")
            .remove(&self.key);
        debug!(key = %self.key, "key released");
    }
}
