//! Observer pattern primitive
//!
//! `ObserverSubject<T>` holds an ordered list of observers and notifies them
//! synchronously. Plain closures are adapted to the same `Observer<T>` trait
//! through `FnObserver`, so object and function observers share one list and
//! one notification order (subscription order).
//!
//! A failing observer (returned `Err` or panic) is logged and skipped; the
//! remaining observers are still notified and the caller never sees the error.

use crate::error::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::error;

/// Something that wants to be told about events of type `T`
pub trait Observer<T>: Send + Sync {
    /// Receive one event
    fn update(&self, event: &T) -> Result<()>;
}

/// Function-based observer for simple cases
pub struct FnObserver<F>(pub F);

impl<T, F> Observer<T> for FnObserver<F>
where
    F: Fn(&T) + Send + Sync,
{
    fn update(&self, event: &T) -> Result<()> {
        (self.0)(event);
        Ok(())
    }
}

/// Outcome of one `notify_observers` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Observers that returned normally
    pub delivered: usize,
    /// Observers that returned an error or panicked
    pub failed: usize,
}

/// Ordered observer registry
pub struct ObserverSubject<T> {
    observers: RwLock<Vec<Arc<dyn Observer<T>>>>,
}

impl<T> ObserverSubject<T> {
    /// Create an empty subject
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Append an observer. The same observer may be subscribed more than once
    /// and is then notified once per subscription.
    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>) {
        self.write().push(observer);
    }

    /// Append a closure observer
    ///
    /// Returns the registered handle, which is what `unsubscribe` expects.
    pub fn subscribe_fn<F>(&self, f: F) -> Arc<dyn Observer<T>>
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let observer: Arc<dyn Observer<T>> = Arc::new(FnObserver(f));
        self.subscribe(Arc::clone(&observer));
        observer
    }

    /// Remove every subscription of `observer`
    ///
    /// Identity is the allocation, not the value. Returns how many entries were
    /// removed; removing an observer that is not subscribed is a no-op.
    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<T>>) -> usize {
        let mut observers = self.write();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        before - observers.len()
    }

    /// Number of subscriptions
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop all subscriptions
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Notify all observers in subscription order
    ///
    /// The list is snapshotted first, so observers may subscribe or
    /// unsubscribe from inside `update` without deadlocking; such changes
    /// apply from the next notification on.
    pub fn notify_observers(&self, event: &T) -> NotifyReport {
        let snapshot: Vec<Arc<dyn Observer<T>>> = self.read().clone();
        let mut report = NotifyReport::default();

        for (index, observer) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.update(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    error!("Observer #{} failed: {}", index, e);
                    report.failed += 1;
                }
                Err(_) => {
                    error!("Observer #{} panicked during notification", index);
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Observer<T>>>> {
        self.observers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Observer<T>>>> {
        self.observers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> Default for ObserverSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObserverSubject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSubject")
            .field("observers", &self.len())
            .finish()
    }
}

/// Compare observers by allocation address (vtable pointers are ignored)
fn same_observer<T>(a: &Arc<dyn Observer<T>>, b: &Arc<dyn Observer<T>>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
