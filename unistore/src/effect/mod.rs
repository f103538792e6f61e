mod cancellation;
mod combine;
mod sender;
mod stream;
mod transform;

pub use cancellation::*;
pub use sender::*;
pub use stream::*;

use crate::Action;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use tracing::trace;

/// The asynchronous unit of work inside a [`Effect`]: runs once with the capability
/// to feed actions back into the store.
pub(crate) type Body<A> = Box<dyn FnOnce(ActionSender<A>) -> BoxFuture<'static, ()> + Send>;

/// Scheduling hint attached to a task effect.
///
/// Tasks all run on the tokio runtime. `Low` tasks yield once before their body
/// starts so work that is already queued gets to run first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

pub(crate) async fn run_body<A: Action>(
    priority: Option<Priority>,
    body: Body<A>,
    send: ActionSender<A>,
) {
    if priority == Some(Priority::Low) {
        tokio::task::yield_now().await;
    }
    body(send).await
}

/// Description of asynchronous work returned by a reducer.
///
/// Building an effect has no side effects; the work starts only when a store
/// runs it. Effects compose with [`Effect::merge`], [`Effect::concatenate`]
/// and [`Effect::map`], and `Effect::none()` is the identity of both
/// composition operators.
#[must_use = "effects do nothing unless returned to a store"]
pub struct Effect<A> {
    operation: Operation<A>,
}

pub(crate) enum Operation<A> {
    None,
    Task {
        priority: Option<Priority>,
        body: Body<A>,
    },
}

impl<A> Effect<A> {
    /// An effect that does nothing.
    pub fn none() -> Self {
        Effect {
            operation: Operation::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.operation, Operation::None)
    }

    /// The priority the effect was created with, if it is a plain task.
    pub fn priority(&self) -> Option<Priority> {
        match &self.operation {
            Operation::None => None,
            Operation::Task { priority, .. } => *priority,
        }
    }

    pub(crate) fn from_operation(operation: Operation<A>) -> Self {
        Effect { operation }
    }

    pub(crate) fn into_operation(self) -> Operation<A> {
        self.operation
    }

    /// Rewrites the body of a task effect, leaving `none` untouched.
    pub(crate) fn map_body(self, f: impl FnOnce(Body<A>) -> Body<A>) -> Self {
        match self.operation {
            Operation::None => Effect::none(),
            Operation::Task { priority, body } => Effect {
                operation: Operation::Task {
                    priority,
                    body: f(body),
                },
            },
        }
    }
}

impl<A: Action> Effect<A> {
    /// Runs `body` concurrently once the effect reaches a store.
    ///
    /// ```no_run
    /// use unistore::Effect;
    ///
    /// enum Action { Tick }
    ///
    /// let effect: Effect<Action> = Effect::task(|send| async move {
    ///     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    ///     send.send(Action::Tick);
    /// });
    /// ```
    pub fn task<F, Fut>(body: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_body(None, body)
    }

    pub fn task_with_priority<F, Fut>(priority: Priority, body: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_body(Some(priority), body)
    }

    /// A task whose failure is routed into `catch`.
    ///
    /// Errors returned after the task has been cancelled are dropped without
    /// calling `catch`, so bodies can bail out with `send.checkpoint()?`.
    pub fn try_task<F, Fut, E, C, CFut>(body: F, catch: C) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + 'static,
        C: FnOnce(E, ActionSender<A>) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
    {
        Self::task(move |send| async move {
            if let Err(error) = body(send.clone()).await {
                if send.is_cancelled() {
                    trace!("error of a cancelled task dropped");
                    return;
                }
                catch(error, send).await;
            }
        })
    }

    /// Feeds `action` back into the store and completes once every task that
    /// action started has finished.
    pub fn emit(action: A) -> Self {
        Self::task(move |send| async move {
            send.send(action).finish().await;
        })
    }

    fn with_body<F, Fut>(priority: Option<Priority>, body: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Effect {
            operation: Operation::Task {
                priority,
                body: Box::new(move |send: ActionSender<A>| body(send).boxed()),
            },
        }
    }
}

impl<A> Default for Effect<A> {
    fn default() -> Self {
        Effect::none()
    }
}

impl<A> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Operation::None => f.write_str("Effect::None"),
            Operation::Task { priority, .. } => f
                .debug_struct("Effect::Task")
                .field("priority", priority)
                .finish_non_exhaustive(),
        }
    }
}
