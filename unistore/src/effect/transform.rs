use super::{ActionSender, Body, CancelId, CancelKey, Effect, Operation};
use crate::{Action, Animation};
use futures::FutureExt;
use std::sync::Arc;
use tracing::debug;

impl<A: Action> Effect<A> {
    /// Converts every action the effect sends. `none` stays `none`.
    pub fn map<B: Action>(self, transform: impl Fn(A) -> B + Send + Sync + 'static) -> Effect<B> {
        match self.into_operation() {
            Operation::None => Effect::none(),
            Operation::Task { priority, body } => {
                let transform: Arc<dyn Fn(A) -> B + Send + Sync> = Arc::new(transform);
                let body: Body<B> =
                    Box::new(move |send: ActionSender<B>| body(send.contramap(transform)));
                Effect::from_operation(Operation::Task { priority, body })
            }
        }
    }

    /// Tags every action the effect sends with `animation`.
    pub fn animation(self, animation: Animation) -> Self {
        self.map_body(move |body| {
            Box::new(move |send: ActionSender<A>| body(send.with_animation(animation)))
        })
    }

    /// Registers the effect's work under `id` so it can be stopped with
    /// [`Effect::cancel`] or [`CancellationRegistry::cancel`].
    ///
    /// With `cancel_in_flight`, work already running under the same `id` is
    /// cancelled and awaited before this one starts.
    ///
    /// [`CancellationRegistry::cancel`]: crate::CancellationRegistry::cancel
    pub fn cancellable(self, id: impl CancelKey, cancel_in_flight: bool) -> Self {
        let id = CancelId::new(id);
        self.map_body(move |body| {
            Box::new(move |send: ActionSender<A>| {
                async move {
                    let registry = send.registry().clone();
                    let parent = send.cancellation_token().clone();
                    let outcome = registry
                        .with_cancellation(id.clone(), &parent, cancel_in_flight, |token| {
                            body(send.with_token(token))
                        })
                        .await;
                    if outcome.is_err() {
                        debug!(?id, "cancellable effect stopped");
                    }
                }
                .boxed()
            })
        })
    }

    /// An effect that cancels all work registered under `id`. It does not touch state.
    pub fn cancel(id: impl CancelKey) -> Self {
        let id = CancelId::new(id);
        Effect::task(move |send| async move {
            send.registry().cancel(id);
        })
    }
}
