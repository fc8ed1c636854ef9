//! Cache State Bus: a process-wide enabled/disabled switch with idempotent
//! transitions and synchronous observer notification.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, OnceLock};

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    disabled: bool,
    listeners: Vec<Listener>,
}

fn inner() -> &'static Mutex<Inner> {
    static STATE: OnceLock<Mutex<Inner>> = OnceLock::new();
    STATE.get_or_init(|| {
        Mutex::new(Inner {
            disabled: false,
            listeners: Vec::new(),
        })
    })
}

/// Process-wide cache enable/disable switch. All [`crate::cache::CacheStore`]
/// instances in the process observe the same state.
pub struct CacheStateBus;

impl CacheStateBus {
    pub fn is_disabled() -> bool {
        inner().lock().unwrap().disabled
    }

    /// Register an observer, called after every state transition with the new state.
    /// Registering does not itself trigger a call.
    pub fn register_listener(listener: Listener) {
        inner().lock().unwrap().listeners.push(listener);
    }

    /// Transition to `disabled`. No-op (no notification) if already in that state.
    /// Notifications run synchronously, after the internal state is committed;
    /// a panicking observer is caught and logged, never propagated.
    pub fn set_disabled(disabled: bool) {
        let listeners = {
            let mut guard = inner().lock().unwrap();
            if guard.disabled == disabled {
                return;
            }
            guard.disabled = disabled;
            guard.listeners.clone()
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(disabled))).is_err() {
                log::error!("cache state observer panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn idempotent_transition_does_not_notify() {
        CacheStateBus::set_disabled(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        CacheStateBus::register_listener(Arc::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        CacheStateBus::set_disabled(false);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        CacheStateBus::set_disabled(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        CacheStateBus::set_disabled(false);
    }
}
