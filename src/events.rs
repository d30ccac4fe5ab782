// Single-threaded event subscriptions
// Listeners are scoped to a Subscription guard and deregister when it drops

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

struct Listener<E> {
    id: u64,
    active: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(&E)>>,
}

struct Listeners<E> {
    next_id: u64,
    entries: Vec<Rc<Listener<E>>>,
}

/// A list of callbacks for one kind of event, dispatched on the calling thread.
///
/// Cloning shares the same listener list.
pub struct EventEmitter<E> {
    inner: Rc<RefCell<Listeners<E>>>,
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback. It stays registered until the returned guard is dropped.
    #[must_use = "dropping the subscription deregisters the listener"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&E) + 'static,
    {
        let listener = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            let listener = Rc::new(Listener {
                id,
                active: Cell::new(true),
                callback: RefCell::new(Box::new(callback) as Box<dyn FnMut(&E)>),
            });
            inner.entries.push(Rc::clone(&listener));
            listener
        };

        let registry: Weak<RefCell<Listeners<E>>> = Rc::downgrade(&self.inner);
        let weak_listener = Rc::downgrade(&listener);
        let id = listener.id;

        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(listener) = weak_listener.upgrade() {
                    listener.active.set(false);
                }
                if let Some(registry) = registry.upgrade() {
                    registry.borrow_mut().entries.retain(|l| l.id != id);
                }
            })),
        }
    }

    /// Deliver an event to every active listener, in registration order.
    ///
    /// Listeners may subscribe or unsubscribe from inside a callback; a
    /// listener cancelled during dispatch is skipped.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Rc<Listener<E>>> = self.inner.borrow().entries.clone();
        for listener in snapshot {
            if !listener.active.get() {
                continue;
            }
            // Re-entrant emission into the same listener is dropped
            if let Ok(mut callback) = listener.callback.try_borrow_mut() {
                callback(event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }
}

/// Guard for a registered listener
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Deregister now instead of at drop
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let emitter = EventEmitter::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let seen = seen.clone();
            emitter.subscribe(move |v| seen.borrow_mut().push(("first", *v)))
        };
        let second = {
            let seen = seen.clone();
            emitter.subscribe(move |v| seen.borrow_mut().push(("second", *v)))
        };

        emitter.emit(&7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
        assert_eq!(emitter.listener_count(), 2);

        drop(first);
        drop(second);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_dropped_subscription_never_fires() {
        let emitter = EventEmitter::<u32>::new();
        let count = Rc::new(Cell::new(0));

        let sub = {
            let count = count.clone();
            emitter.subscribe(move |_| count.set(count.get() + 1))
        };
        emitter.emit(&1);
        drop(sub);
        emitter.emit(&2);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_cancel_during_dispatch_skips_later_listener() {
        let emitter = EventEmitter::<u32>::new();
        let count = Rc::new(Cell::new(0));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _killer = {
            let victim = victim.clone();
            emitter.subscribe(move |_| {
                victim.borrow_mut().take();
            })
        };
        *victim.borrow_mut() = Some({
            let count = count.clone();
            emitter.subscribe(move |_| count.set(count.get() + 1))
        });

        emitter.emit(&1);
        assert_eq!(count.get(), 0);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn test_subscription_outliving_emitter_is_harmless() {
        let emitter = EventEmitter::<u32>::new();
        let sub = emitter.subscribe(|_| {});
        drop(emitter);
        sub.cancel();
    }
}
