//! Observer registration with scoped lifetimes.
//!
//! Every change stream in the tree layer is an [`EventEmitter`]. Subscribing
//! returns a [`Disposable`]; dropping or disposing it removes the listener.
//! Owners that hold many subscriptions keep them in a [`DisposableStore`],
//! which is torn down exactly once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ListenerList<T> = Mutex<Vec<(u64, Listener<T>)>>;

/// Multi-listener event source.
///
/// Cloning an emitter yields another handle to the same listener list, so a
/// manager can hand a clone to a closure that republishes upstream events.
pub struct EventEmitter<T> {
    listeners: Arc<ListenerList<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl<T: 'static> EventEmitter<T> {
    /// Register a listener. The listener stays attached until the returned
    /// [`Disposable`] is disposed or dropped.
    #[must_use = "dropping the Disposable immediately removes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Disposable
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, Arc::new(listener))),
            Err(e) => {
                warn!("Failed to register event listener: {}", e);
                return Disposable::none();
            }
        }

        let weak: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
        Disposable::new(move || {
            if let Some(listeners) = weak.upgrade() {
                if let Ok(mut listeners) = listeners.lock() {
                    listeners.retain(|(listener_id, _)| *listener_id != id);
                }
            }
        })
    }

    /// Deliver `event` to every listener registered at the time of the call.
    ///
    /// The listener list is snapshotted before any listener runs, so listeners
    /// may subscribe, dispose or fire again without deadlocking.
    pub fn fire(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(e) => {
                warn!("Failed to snapshot event listeners: {}", e);
                return;
            }
        };

        for listener in snapshot {
            listener(event);
        }
    }
}

/// Handle that undoes a registration exactly once.
#[must_use = "dropping a Disposable runs its cleanup immediately"]
pub struct Disposable {
    cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Disposable {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// A disposable with nothing to clean up.
    pub fn none() -> Self {
        Self { cleanup: None }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    pub fn is_disposed(&self) -> bool {
        self.cleanup.is_none()
    }

    fn run(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Owning collection of disposables with a single teardown.
#[derive(Debug)]
pub struct DisposableStore {
    items: Mutex<Option<Vec<Disposable>>>,
}

impl Default for DisposableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DisposableStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Some(Vec::new())),
        }
    }

    /// Take ownership of `disposable`. Adding to an already disposed store
    /// disposes the item right away.
    pub fn add(&self, disposable: Disposable) {
        let rejected = match self.items.lock() {
            Ok(mut items) => match items.as_mut() {
                Some(items) => {
                    items.push(disposable);
                    None
                }
                None => Some(disposable),
            },
            Err(_) => Some(disposable),
        };

        if let Some(disposable) = rejected {
            disposable.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .ok()
            .and_then(|items| items.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.items.lock().map(|items| items.is_none()).unwrap_or(true)
    }

    /// Dispose every held item. Later calls are no-ops.
    pub fn dispose(&self) {
        let items = match self.items.lock() {
            Ok(mut items) => items.take(),
            Err(e) => {
                warn!("Disposable store lock poisoned during teardown: {}", e);
                None
            }
        };

        // Cleanups run outside the lock; they may touch other stores.
        for item in items.into_iter().flatten() {
            item.dispose();
        }
    }
}

impl Drop for DisposableStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fire_reaches_all_listeners() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&total);
        let _a = emitter.subscribe(move |v| {
            t1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let t2 = Arc::clone(&total);
        let _b = emitter.subscribe(move |v| {
            t2.fetch_add(*v as usize * 10, Ordering::SeqCst);
        });

        emitter.fire(&2);
        assert_eq!(total.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn test_dropping_disposable_unsubscribes() {
        let emitter: EventEmitter<()> = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let sub = emitter.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        emitter.fire(&());
        drop(sub);
        emitter.fire(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_fire_reentrantly() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = emitter.clone();
        let s = Arc::clone(&seen);
        let _sub = emitter.subscribe(move |v| {
            s.lock().unwrap().push(*v);
            if *v > 0 {
                inner.fire(&(v - 1));
            }
        });

        emitter.fire(&2);
        assert_eq!(*seen.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_store_disposes_exactly_once() {
        let store = DisposableStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            store.add(Disposable::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(store.len(), 3);

        store.dispose();
        store.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(store.is_disposed());

        let c = Arc::clone(&count);
        store.add(Disposable::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }
}
