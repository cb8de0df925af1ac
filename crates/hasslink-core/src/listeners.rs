// ── Callback listener registry ──
//
// Synchronous fan-out for consumers that want a callback instead of a
// stream. Each listener call is isolated: a panicking listener is logged
// and skipped, the rest still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A set of callbacks notified with `&T`.
pub struct Listeners<T> {
    registry: Arc<Registry<T>>,
}

struct Registry<T> {
    kind: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry, _)| *entry != id);
    }
}

impl<T: 'static> Listeners<T> {
    /// `kind` names the registry in log output.
    pub fn new(kind: &'static str) -> Self {
        Self {
            registry: Arc::new(Registry {
                kind,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn add<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(f)));

        let weak: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.remove(id);
                }
            })),
        }
    }

    /// Call every registered listener with `value`.
    ///
    /// Works on a copy of the listener list, so a callback may add or
    /// remove listeners (itself included) without deadlocking.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<(u64, Callback<T>)> = self
            .registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                tracing::warn!(
                    listener = id,
                    kind = self.registry.kind,
                    "listener panicked; skipping"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unregisters the listener immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unregister now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Keep the listener registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
