mod binding;
mod flush;
mod observe;
mod root;
mod scope;
mod task;

pub use binding::*;
pub use observe::{Change, Subscription};
pub use task::*;

pub(crate) use flush::Flush;

use crate::effect::Operation;
use crate::{
    Action, ActionSender, Animation, CancellationRegistry, Dependency, Reducer, State, StoreError,
};
use futures::StreamExt;
use futures_signals::signal::{BoxSignal, SignalExt, SignalStream};
use observe::Observer;
use parking_lot::RwLock;
use root::RootCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Work run inside a flush against the live state of the root store.
pub(crate) type Job<S> = Box<dyn FnOnce(&mut S, &mut Flush) + Send>;

pub(crate) type Equivalence<S> = Arc<dyn Fn(&S, &S) -> bool + Send + Sync>;

/// Runs when a root store starts draining its buffer.
pub(crate) type FlushHook = Box<dyn Fn(&mut Flush) + Send + Sync>;

/// Where a store's state lives: its own cell, or a projection of its parent's.
pub(crate) trait StateHost<S>: Send + Sync {
    fn schedule(&self, job: Job<S>, animation: Option<Animation>) -> TaskHandle;
    fn snapshot(&self) -> S;
    fn registry(&self) -> &CancellationRegistry;
    fn signal(&self) -> BoxSignal<'static, S>;
    fn observe(&self, observer: Observer<S>) -> Subscription;

    /// Installs `hook` to run at the start of every flush. Only root cells run flushes.
    fn on_flush(&self, _hook: FlushHook) {}
}

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(0);

pub(crate) struct Node<S: State, A: Action, D: Dependency> {
    id: usize,
    this: Weak<Node<S, A, D>>,
    reducer: Arc<dyn Reducer<State = S, Action = A, Dependency = D>>,
    dependency: RwLock<D>,
    lifetime: CancellationToken,
    host: Box<dyn StateHost<S>>,
}

impl<S: State, A: Action, D: Dependency> Node<S, A, D> {
    fn dispatch(&self, action: A, animation: Option<Animation>) -> TaskHandle {
        let Some(node) = self.this.upgrade() else {
            warn!(store = self.id, "action sent to a store that is being dropped");
            return TaskHandle::default();
        };
        self.host.schedule(
            Box::new(move |state: &mut S, flush: &mut Flush| {
                node.reduce_in_flush(state, action, flush)
            }),
            animation,
        )
    }

    /// The dependency this store uses for the rest of `flush`.
    fn dependency_in(&self, flush: &mut Flush) -> D {
        flush.dependency(self.id, || self.dependency.read().clone())
    }

    /// Runs the reducer against `state` and spawns the returned effect into `flush`.
    fn reduce_in_flush(&self, state: &mut S, action: A, flush: &mut Flush) {
        let dependency = self.dependency_in(flush);
        let effect = self.reducer.reduce(state, action, &dependency);
        if let Operation::Task { priority, body } = effect.into_operation() {
            let this = self.this.clone();
            let registry = self.host.registry().clone();
            flush.spawn(&self.lifetime, priority, body, move |token| {
                ActionSender::new(
                    move |action, animation| match this.upgrade() {
                        Some(node) => node.dispatch(action, animation),
                        None => {
                            trace!("action sent to a dropped store ignored");
                            TaskHandle::default()
                        }
                    },
                    token,
                    registry,
                )
            });
        }
    }
}

impl<S: State, A: Action, D: Dependency> Drop for Node<S, A, D> {
    fn drop(&mut self) {
        self.lifetime.cancel();
        trace!(store = self.id, "store dropped, its tasks are cancelled");
    }
}

/// Owns a state value, serializes its mutation through a reducer and runs the
/// effects the reducer returns.
///
/// A root store holds its own state. A scoped store, created with
/// [`Store::scope`], reads a projection of its parent's state and dispatches
/// through its parent's loop, so the whole tree shares one serialization
/// point and one [`CancellationRegistry`]. Cloning a store yields another
/// handle to the same store; when the last handle is dropped, every task the
/// store started is cancelled.
///
/// Effects are spawned on the ambient tokio runtime.
pub struct Store<S: State, A: Action, D: Dependency = ()> {
    node: Arc<Node<S, A, D>>,
}

impl<S: State, A: Action, D: Dependency> Clone for Store<S, A, D> {
    fn clone(&self) -> Self {
        Store {
            node: self.node.clone(),
        }
    }
}

impl<S: State, A: Action, D: Dependency> Store<S, A, D> {
    pub fn new<R>(initial_state: S, reducer: R, dependency: D) -> Self
    where
        R: Reducer<State = S, Action = A, Dependency = D>,
    {
        Self::builder(initial_state, reducer, dependency).build()
    }

    pub fn builder<R>(initial_state: S, reducer: R, dependency: D) -> StoreBuilder<S, A, D>
    where
        R: Reducer<State = S, Action = A, Dependency = D>,
    {
        StoreBuilder::with_source(Source::Root(initial_state), Arc::new(reducer), dependency)
    }

    /// Dispatches `action`.
    ///
    /// If no flush is running, the action is reduced right away together with
    /// everything sent while this flush drains, and the returned handle covers
    /// every task started by the flush. If a flush is already running, the
    /// action is queued behind it and the returned handle covers the tasks
    /// this action starts once it is reduced.
    pub fn send(&self, action: A) -> TaskHandle {
        self.node.dispatch(action, None)
    }

    /// Dispatches `action`, attaching `animation` to the resulting change.
    pub fn send_animated(&self, action: A, animation: Animation) -> TaskHandle {
        self.node.dispatch(action, Some(animation))
    }

    /// Dispatches `action` and waits until the state no longer satisfies `predicate`.
    ///
    /// Dropping the returned future cancels the tasks started by the action.
    pub async fn send_while(&self, action: A, predicate: impl Fn(&S) -> bool + Send) {
        let task = self.send(action);
        let guard = task.cancel_on_drop();
        let mut states = self.to_stream();
        while let Some(state) = states.next().await {
            if !predicate(&state) {
                break;
            }
        }
        if let Some(guard) = guard {
            guard.disarm();
        }
    }

    /// Like [`send_while`](Self::send_while), but gives up after `timeout` and
    /// cancels the action's tasks.
    pub async fn send_while_timeout(
        &self,
        action: A,
        predicate: impl Fn(&S) -> bool + Send,
        timeout: Duration,
    ) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.send_while(action, predicate))
            .await
            .map_err(|_| StoreError::Timeout(timeout))
    }

    /// The last committed state.
    pub fn state(&self) -> S {
        self.node.host.snapshot()
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.node.host.snapshot())
    }

    /// A signal of the committed state. Signals are lossy: only the latest value
    /// is observed.
    pub fn to_signal(&self) -> BoxSignal<'static, S> {
        self.node.host.signal()
    }

    pub fn to_stream(&self) -> SignalStream<BoxSignal<'static, S>> {
        self.to_signal().to_stream()
    }

    /// Calls `observer` once after every flush that changed the state.
    pub fn on_change(
        &self,
        observer: impl Fn(&Change<'_, S>) + Send + Sync + 'static,
    ) -> Subscription {
        self.node.host.observe(Arc::new(observer))
    }

    pub fn dependency(&self) -> D {
        self.node.dependency.read().clone()
    }

    /// Replaces the dependency. A root store reads its dependency when a flush
    /// starts; a scoped store reads it the first time it reduces in a flush.
    /// Either way the value stays fixed until the flush ends.
    pub fn set_dependency(&self, dependency: D) {
        *self.node.dependency.write() = dependency;
    }

    pub fn registry(&self) -> CancellationRegistry {
        self.node.host.registry().clone()
    }
}

impl<S: State, A: Action, D: Dependency> fmt::Debug for Store<S, A, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.node.id)
            .finish_non_exhaustive()
    }
}

type Attach<S> = Box<dyn FnOnce(Option<Equivalence<S>>) -> (Box<dyn StateHost<S>>, CancellationToken)>;

enum Source<S> {
    Root(S),
    Scope(Attach<S>),
}

/// Configures a [`Store`] before it is built.
///
/// ```
/// use unistore::{reducer_fn, Effect, Store};
///
/// let store = Store::builder(0, reducer_fn(|n: &mut i32, a: i32, _: &()| {
///     *n = a;
///     Effect::none()
/// }), ())
/// .remove_duplicates()
/// .build();
///
/// let changes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
/// let counter = changes.clone();
/// let _subscription = store.on_change(move |_| {
///     counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
/// });
/// store.send(0);
/// store.send(1);
/// assert_eq!(changes.load(std::sync::atomic::Ordering::SeqCst), 1);
/// ```
#[must_use = "call `build` to create the store"]
pub struct StoreBuilder<S: State, A: Action, D: Dependency> {
    source: Source<S>,
    reducer: Arc<dyn Reducer<State = S, Action = A, Dependency = D>>,
    dependency: D,
    equivalence: Option<Equivalence<S>>,
    registry: Option<CancellationRegistry>,
}

impl<S: State, A: Action, D: Dependency> StoreBuilder<S, A, D> {
    fn with_source(
        source: Source<S>,
        reducer: Arc<dyn Reducer<State = S, Action = A, Dependency = D>>,
        dependency: D,
    ) -> Self {
        StoreBuilder {
            source,
            reducer,
            dependency,
            equivalence: None,
            registry: None,
        }
    }

    /// Skips committing and notifying when a flush leaves the state equal to before.
    pub fn remove_duplicates(self) -> Self
    where
        S: PartialEq,
    {
        self.remove_duplicates_by(|lhs: &S, rhs: &S| lhs == rhs)
    }

    pub fn remove_duplicates_by(
        mut self,
        is_duplicate: impl Fn(&S, &S) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equivalence = Some(Arc::new(is_duplicate));
        self
    }

    /// Shares `registry` with the new store tree. Scoped stores always use
    /// their parent's registry and ignore this setting.
    pub fn registry(mut self, registry: CancellationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn dependency(mut self, dependency: D) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn build(self) -> Store<S, A, D> {
        let is_root = matches!(self.source, Source::Root(_));
        let (host, lifetime) = match self.source {
            Source::Root(initial_state) => {
                let registry = self.registry.unwrap_or_default();
                let host: Box<dyn StateHost<S>> =
                    Box::new(RootCell::new(initial_state, registry, self.equivalence));
                (host, CancellationToken::new())
            }
            Source::Scope(attach) => {
                if self.registry.is_some() {
                    warn!("scoped stores use their parent's registry, the configured one is ignored");
                }
                attach(self.equivalence)
            }
        };
        let node = Arc::new_cyclic(|this| Node {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            reducer: self.reducer,
            dependency: RwLock::new(self.dependency),
            lifetime,
            host,
        });
        if is_root {
            let this = node.this.clone();
            node.host.on_flush(Box::new(move |flush: &mut Flush| {
                if let Some(node) = this.upgrade() {
                    node.dependency_in(flush);
                }
            }));
        }
        trace!(store = node.id, "store created");
        Store { node }
    }
}
