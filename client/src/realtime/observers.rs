//! Callback registry with explicit unsubscribe handles.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registered callbacks for one kind of event.
///
/// Callbacks run in registration order. Notification works on a snapshot of
/// the list, so a callback may register or unsubscribe without deadlocking.
pub struct Observers<T> {
    inner: Arc<Registry<T>>,
}

struct Registry<T> {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
}

/// Removal hook held weakly by a [`Subscription`].
trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

impl<T: 'static> Unregister for Registry<T> {
    fn unregister(&self, id: u64) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(registered, _)| *registered != id);
    }
}

impl<T: 'static> Observers<T> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register `callback`; it stays registered until the handle is unsubscribed.
    pub fn register<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let registry: Arc<dyn Unregister> = self.inner.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&registry),
            active: AtomicBool::new(true),
        }
    }

    /// Call every registered callback with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(value);
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").finish_non_exhaustive()
    }
}

/// Handle to one registration.
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Unregister>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the callback. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }

    /// Whether `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Observers<u32>) {
        (Arc::new(Mutex::new(Vec::new())), Observers::new())
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let (log, observers) = recorder();
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);

        let _a = observers.register(move |v| first.lock().unwrap_or_else(PoisonError::into_inner).push(format!("a{v}")));
        let _b = observers.register(move |v| second.lock().unwrap_or_else(PoisonError::into_inner).push(format!("b{v}")));

        observers.notify(&1);
        assert_eq!(*log.lock().unwrap_or_else(PoisonError::into_inner), vec!["a1", "b1"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_targeted() {
        let (log, observers) = recorder();
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);

        let a = observers.register(move |v| first.lock().unwrap_or_else(PoisonError::into_inner).push(format!("a{v}")));
        let _b = observers.register(move |v| second.lock().unwrap_or_else(PoisonError::into_inner).push(format!("b{v}")));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(observers.len(), 1);

        observers.notify(&2);
        assert_eq!(*log.lock().unwrap_or_else(PoisonError::into_inner), vec!["b2"]);
    }

    #[test]
    fn test_same_closure_registered_twice_is_two_registrations() {
        let observers = Observers::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));

        let make = || {
            let count = Arc::clone(&count);
            move |_: &u32| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        };
        let first = observers.register(make());
        let _second = observers.register(make());

        first.unsubscribe();
        observers.notify(&0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let observers = Observers::<u32>::new();
        let subscription = observers.register(|_| {});
        drop(observers);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_callback_may_unsubscribe_during_notify() {
        let observers = Observers::<u32>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);

        let subscription = observers.register(move |_| {
            if let Some(sub) = inner.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        observers.notify(&0);
        assert!(observers.is_empty());
    }
}
