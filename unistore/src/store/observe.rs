use crate::Animation;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// A committed state change, delivered once per flush.
#[derive(Debug)]
pub struct Change<'a, S> {
    pub state: &'a S,
    /// Animation requested by the first animated action of the flush.
    pub animation: Option<&'a Animation>,
}

pub(crate) type Observer<S> = Arc<dyn Fn(&Change<'_, S>) + Send + Sync>;

struct Registered<S> {
    key: u64,
    observer: Observer<S>,
}

struct ObserverList<S> {
    next: u64,
    entries: Vec<Registered<S>>,
}

pub(crate) struct Observers<S> {
    list: Arc<Mutex<ObserverList<S>>>,
}

impl<S: 'static> Observers<S> {
    pub(crate) fn new() -> Self {
        Observers {
            list: Arc::new(Mutex::new(ObserverList {
                next: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn subscribe(&self, observer: Observer<S>) -> Subscription {
        let key = {
            let mut list = self.list.lock();
            let key = list.next;
            list.next += 1;
            list.entries.push(Registered { key, observer });
            key
        };
        let list: Weak<Mutex<ObserverList<S>>> = Arc::downgrade(&self.list);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.lock().entries.retain(|entry| entry.key != key);
            }
        })
    }

    /// Calls every observer outside the lock, so observers may subscribe,
    /// unsubscribe or send actions.
    pub(crate) fn notify(&self, change: &Change<'_, S>) {
        let observers: Vec<Observer<S>> = self
            .list
            .lock()
            .entries
            .iter()
            .map(|entry| entry.observer.clone())
            .collect();
        for observer in observers {
            observer(change);
        }
    }
}

/// Keeps a change observer registered; dropping it unregisters the observer.
#[must_use = "the observer is removed when the subscription is dropped"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Keeps the observer registered for as long as the store lives.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
