use crate::{Action, Animation, Cancelled, CancellationRegistry, TaskHandle};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;

type Sink<A> = Arc<dyn Fn(A, Option<Animation>) -> TaskHandle + Send + Sync>;

/// Capability handed to a running effect for feeding actions back into its store.
///
/// Once the task that owns the sender is cancelled, every send is silently
/// dropped. Long-running bodies should also watch [`is_cancelled`] or
/// [`cancelled`] and return promptly.
///
/// [`is_cancelled`]: ActionSender::is_cancelled
/// [`cancelled`]: ActionSender::cancelled
pub struct ActionSender<A> {
    sink: Sink<A>,
    token: CancellationToken,
    registry: CancellationRegistry,
    animation: Option<Animation>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        ActionSender {
            sink: self.sink.clone(),
            token: self.token.clone(),
            registry: self.registry.clone(),
            animation: self.animation.clone(),
        }
    }
}

impl<A: Action> ActionSender<A> {
    pub(crate) fn new(
        sink: impl Fn(A, Option<Animation>) -> TaskHandle + Send + Sync + 'static,
        token: CancellationToken,
        registry: CancellationRegistry,
    ) -> Self {
        ActionSender {
            sink: Arc::new(sink),
            token,
            registry,
            animation: None,
        }
    }

    /// Sends `action` to the store. The returned handle covers the tasks the
    /// action starts, also when the action is buffered behind a flush in
    /// progress. It is already finished when this sender is cancelled.
    pub fn send(&self, action: A) -> TaskHandle {
        self.dispatch(action, self.animation.clone())
    }

    /// Sends `action` and asks the view layer to animate the resulting change.
    pub fn send_animated(&self, action: A, animation: Animation) -> TaskHandle {
        self.dispatch(action, Some(animation))
    }

    fn dispatch(&self, action: A, animation: Option<Animation>) -> TaskHandle {
        if self.token.is_cancelled() {
            trace!("action sent from a cancelled task dropped");
            return TaskHandle::default();
        }
        (self.sink)(action, animation)
    }

    /// Narrows the sender to another action type by converting every action it sends.
    pub(crate) fn contramap<B: Action>(self, f: Arc<dyn Fn(B) -> A + Send + Sync>) -> ActionSender<B> {
        let sink = self.sink;
        ActionSender {
            sink: Arc::new(move |action, animation| sink(f(action), animation)),
            token: self.token,
            registry: self.registry,
            animation: self.animation,
        }
    }

    /// A sender that also keeps the handle of every action it sends, so the
    /// caller can wait for the work those actions started.
    pub(crate) fn tracking(&self) -> (Self, Arc<Mutex<Vec<TaskHandle>>>) {
        let handles = Arc::new(Mutex::new(Vec::new()));
        let sent = handles.clone();
        let sink = self.sink.clone();
        let sender = ActionSender {
            sink: Arc::new(move |action, animation| {
                let handle = sink(action, animation);
                sent.lock().push(handle.clone());
                handle
            }),
            token: self.token.clone(),
            registry: self.registry.clone(),
            animation: self.animation.clone(),
        };
        (sender, handles)
    }

    /// Calls `observer` with every action before it is sent.
    pub(crate) fn inspect(self, observer: impl Fn(&A) + Send + Sync + 'static) -> Self {
        let sink = self.sink;
        ActionSender {
            sink: Arc::new(move |action, animation| {
                observer(&action);
                sink(action, animation)
            }),
            ..self
        }
    }
}

impl<A> ActionSender<A> {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the owning task is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Returns `Err(Cancelled)` once the owning task is cancelled, for use with `?`.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// The registry `cancellable` effects started from this sender register with.
    pub fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }

    pub(crate) fn with_token(&self, token: CancellationToken) -> Self {
        ActionSender {
            sink: self.sink.clone(),
            token,
            registry: self.registry.clone(),
            animation: self.animation.clone(),
        }
    }

    pub(crate) fn with_animation(mut self, animation: Animation) -> Self {
        self.animation = Some(animation);
        self
    }
}

impl<A> fmt::Debug for ActionSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSender")
            .field("cancelled", &self.token.is_cancelled())
            .field("animation", &self.animation)
            .finish_non_exhaustive()
    }
}
