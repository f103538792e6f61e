#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use unistore::{reducer_fn, Change, Effect, Reducer, Store, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub enum CounterAction {
    Increment,
    Decrement,
    Add(i32),
    /// Adds the value after `delay`.
    AddLater(i32, Duration),
}

pub fn counter() -> impl Reducer<State = i32, Action = CounterAction, Dependency = ()> {
    reducer_fn(|count: &mut i32, action: CounterAction, _: &()| match action {
        CounterAction::Increment => {
            *count += 1;
            Effect::none()
        }
        CounterAction::Decrement => {
            *count -= 1;
            Effect::none()
        }
        CounterAction::Add(value) => {
            *count += value;
            Effect::none()
        }
        CounterAction::AddLater(value, delay) => Effect::task(move |send| async move {
            tokio::time::sleep(delay).await;
            send.send(CounterAction::Add(value));
        }),
    })
}

/// Records every change notification a store emits.
pub struct Recorder<S> {
    changes: Arc<Mutex<Vec<S>>>,
    _subscription: Subscription,
}

impl<S: unistore::State> Recorder<S> {
    pub fn attach<A: unistore::Action, D: unistore::Dependency>(store: &Store<S, A, D>) -> Self {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let log = changes.clone();
        let subscription = store.on_change(move |change: &Change<'_, S>| {
            log.lock().push(change.state.clone());
        });
        Recorder {
            changes,
            _subscription: subscription,
        }
    }

    pub fn changes(&self) -> Vec<S> {
        self.changes.lock().clone()
    }
}
