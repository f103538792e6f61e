use super::flush::{Flush, SendTasks};
use super::observe::{Change, Observer, Observers, Subscription};
use super::{Equivalence, FlushHook, Job, StateHost};
use crate::{Animation, CancellationRegistry, State, TaskHandle};
use futures_signals::signal::{BoxSignal, Mutable, SignalExt};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Scheduled<S> {
    job: Job<S>,
    animation: Option<Animation>,
    tasks: Option<SendTasks>,
}

struct Queue<S> {
    buffer: VecDeque<Scheduled<S>>,
    dispatching: bool,
    /// Cancellation group of the running flush.
    group: CancellationToken,
    /// Number of commits so far.
    generation: u64,
}

/// State cell and dispatch loop of a root store.
///
/// `schedule` appends to the buffer. The first caller to find the loop idle
/// drains the buffer, reducing against a private copy of the state, then
/// commits that copy once and notifies observers once. Callers arriving while
/// a drain is running only enqueue and return a handle that completes once
/// their action was reduced and the tasks it started have finished.
///
/// Commits are numbered. Notifications are published one at a time and a
/// commit older than the last published one is never announced, so the last
/// change an observer saw is always the committed state.
pub(crate) struct RootCell<S: State> {
    state: Mutable<S>,
    queue: Mutex<Queue<S>>,
    published: ReentrantMutex<Cell<u64>>,
    observers: Observers<S>,
    registry: CancellationRegistry,
    equivalence: Option<Equivalence<S>>,
    on_flush: OnceLock<FlushHook>,
}

impl<S: State> RootCell<S> {
    pub(crate) fn new(
        initial_state: S,
        registry: CancellationRegistry,
        equivalence: Option<Equivalence<S>>,
    ) -> Self {
        RootCell {
            state: Mutable::new(initial_state),
            queue: Mutex::new(Queue {
                buffer: VecDeque::new(),
                dispatching: false,
                group: CancellationToken::new(),
                generation: 0,
            }),
            published: ReentrantMutex::new(Cell::new(0)),
            observers: Observers::new(),
            registry,
            equivalence,
            on_flush: OnceLock::new(),
        }
    }

    fn drain(&self, group: CancellationToken) -> TaskHandle {
        let mut reset = ResetOnUnwind {
            queue: &self.queue,
            armed: true,
        };
        let mut state = self.state.get_cloned();
        let mut flush = Flush::new(group);
        if let Some(on_flush) = self.on_flush.get() {
            on_flush(&mut flush);
        }

        let committed = loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.buffer.pop_front() {
                    Some(next) => next,
                    None => {
                        let changed = match &self.equivalence {
                            Some(equivalent) => {
                                let current = self.state.lock_ref();
                                !equivalent(&*current, &state)
                            }
                            None => true,
                        };
                        let committed = changed.then(|| {
                            self.state.set(state.clone());
                            queue.generation += 1;
                            queue.generation
                        });
                        queue.dispatching = false;
                        debug_assert!(queue.buffer.is_empty());
                        break committed;
                    }
                }
            };
            flush.absorb(next.animation, next.tasks);
            (next.job)(&mut state, &mut flush);
        };
        reset.armed = false;

        trace!(
            actions = flush.actions(),
            tasks = flush.spawned(),
            changed = committed.is_some(),
            "flush committed"
        );
        if let Some(generation) = committed {
            self.publish(generation, &state, flush.animation());
        }
        flush.finish().0
    }

    fn publish(&self, generation: u64, state: &S, animation: Option<&Animation>) {
        let published = self.published.lock();
        if published.get() > generation {
            trace!(generation, "newer change already published, skipped");
            return;
        }
        published.set(generation);
        self.observers.notify(&Change { state, animation });
    }
}

impl<S: State> StateHost<S> for RootCell<S> {
    fn schedule(&self, job: Job<S>, animation: Option<Animation>) -> TaskHandle {
        let group = {
            let mut queue = self.queue.lock();
            if queue.dispatching {
                let tasks = SendTasks::new(&queue.group);
                let handle = tasks.handle();
                queue.buffer.push_back(Scheduled {
                    job,
                    animation,
                    tasks: Some(tasks),
                });
                trace!(buffered = queue.buffer.len(), "flush in progress, action buffered");
                return handle;
            }
            queue.buffer.push_back(Scheduled {
                job,
                animation,
                tasks: None,
            });
            queue.dispatching = true;
            queue.group = CancellationToken::new();
            queue.group.clone()
        };
        self.drain(group)
    }

    fn snapshot(&self) -> S {
        self.state.get_cloned()
    }

    fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }

    fn signal(&self) -> BoxSignal<'static, S> {
        self.state.signal_cloned().boxed()
    }

    fn observe(&self, observer: Observer<S>) -> Subscription {
        self.observers.subscribe(observer)
    }

    fn on_flush(&self, hook: FlushHook) {
        if self.on_flush.set(hook).is_err() {
            trace!("flush hook already installed");
        }
    }
}

/// Returns the loop to idle and drops pending work if a reducer panics mid-flush.
struct ResetOnUnwind<'a, S> {
    queue: &'a Mutex<Queue<S>>,
    armed: bool,
}

impl<S> Drop for ResetOnUnwind<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            let mut queue = self.queue.lock();
            queue.buffer.clear();
            queue.dispatching = false;
        }
    }
}
