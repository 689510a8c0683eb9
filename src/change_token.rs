//! File change notifications
//!
//! A change token is a fire-once subscription. Once it fires, every callback
//! registered on it runs exactly once; to keep watching a file the caller asks
//! the provider for a new token.

use parking_lot::Mutex;
use std::fmt;

/// Callback invoked when a change token fires
pub type ChangeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Subscription to a change notification
pub trait ChangeToken: Send + Sync {
    /// Whether the token has already fired
    fn has_changed(&self) -> bool;

    /// Register a callback to run when the token fires.
    ///
    /// If the token already fired the callback runs immediately on the
    /// calling thread.
    fn register_callback(&self, callback: ChangeCallback);
}

/// Fire-once token triggered explicitly by its owner.
///
/// Callbacks always run outside the token's lock, so a callback may touch the
/// token (or any other lock) without deadlocking.
#[derive(Default)]
pub struct TriggerToken {
    state: Mutex<TriggerState>,
}

#[derive(Default)]
struct TriggerState {
    fired: bool,
    callbacks: Vec<ChangeCallback>,
}

impl TriggerToken {
    /// Create an unfired token
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token, running all pending callbacks.
    ///
    /// Returns `false` if the token had already fired.
    pub fn fire(&self) -> bool {
        let callbacks = {
            let mut state = self.state.lock();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.callbacks)
        };

        for callback in callbacks {
            callback();
        }
        true
    }

    /// Number of callbacks waiting for the token to fire
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }
}

impl ChangeToken for TriggerToken {
    fn has_changed(&self) -> bool {
        self.state.lock().fired
    }

    fn register_callback(&self, callback: ChangeCallback) {
        {
            let mut state = self.state.lock();
            if !state.fired {
                state.callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl fmt::Debug for TriggerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TriggerToken")
            .field("fired", &state.fired)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ChangeCallback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_fire_runs_callbacks_once() {
        let token = TriggerToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        token.register_callback(counting_callback(&counter));
        token.register_callback(counting_callback(&counter));
        assert_eq!(token.pending_callbacks(), 2);
        assert!(!token.has_changed());

        assert!(token.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(token.has_changed());

        assert!(!token.fire());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_register_after_fire_runs_immediately() {
        let token = TriggerToken::new();
        token.fire();

        let counter = Arc::new(AtomicUsize::new(0));
        token.register_callback(counting_callback(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(token.pending_callbacks(), 0);
    }

    #[test]
    fn test_callback_may_reenter_token() {
        let token = Arc::new(TriggerToken::new());
        let observed = Arc::new(AtomicUsize::new(0));

        let inner_token = token.clone();
        let inner_observed = observed.clone();
        token.register_callback(Box::new(move || {
            if inner_token.has_changed() {
                inner_observed.fetch_add(1, Ordering::SeqCst);
            }
        }));

        token.fire();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }
}
