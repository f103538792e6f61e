use super::{run_body, ActionSender, Effect, Operation};
use crate::{Action, CancellationRegistry, TaskHandle};
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::StreamExt;
use futures_core::stream::Stream;
use pin_project::pin_project;
use std::pin::{pin, Pin};
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, DropGuard};

impl<A: Action> Effect<A> {
    /// A long-living effect that sends every item of `stream` as an action.
    ///
    /// Cancellation is checked between items; pair it with
    /// [`Effect::cancellable`] to stop it from outside.
    pub fn stream<St>(stream: St) -> Self
    where
        St: Stream<Item = A> + Send + 'static,
    {
        Effect::task(move |send| async move {
            let mut stream = pin!(stream);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = send.cancelled() => break,
                    next = stream.next() => next,
                };
                match next {
                    Some(action) => {
                        send.send(action);
                    }
                    None => break,
                }
            }
        })
    }

    /// Runs the effect outside of any store and yields the actions it sends.
    ///
    /// The stream ends once the effect completes. Dropping it cancels the
    /// effect. Must be called from within a tokio runtime.
    pub fn into_stream(self, registry: CancellationRegistry) -> EffectStream<A> {
        let (sender, receiver) = mpsc::unbounded();
        let token = CancellationToken::new();
        if let Operation::Task { priority, body } = self.into_operation() {
            let send = ActionSender::new(
                move |action, _| {
                    let _ = sender.unbounded_send(action);
                    TaskHandle::default()
                },
                token.child_token(),
                registry,
            );
            let lifetime = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = lifetime.cancelled() => {}
                    _ = run_body(priority, body, send) => {}
                }
            });
        }
        EffectStream {
            receiver,
            guard: token.drop_guard(),
        }
    }
}

/// Stream of the actions sent by an effect running detached from a store.
///
/// Created by [`Effect::into_stream`].
#[pin_project]
#[derive(Debug)]
#[must_use = "Streams do nothing unless polled"]
pub struct EffectStream<A> {
    #[pin]
    receiver: UnboundedReceiver<A>,
    guard: DropGuard,
}

impl<A> Stream for EffectStream<A> {
    type Item = A;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().receiver.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stream_forwards_items() {
        let effect = Effect::stream(futures::stream::iter(vec![1, 2, 3]));
        let actions: Vec<i32> = effect.into_stream(CancellationRegistry::new()).collect().await;
        assert_eq!(actions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_none_ends_immediately() {
        let mut stream = Effect::<i32>::none().into_stream(CancellationRegistry::new());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stream_cancels_effect() {
        let (finished_tx, finished_rx) = tokio::sync::oneshot::channel::<()>();
        let effect: Effect<i32> = Effect::task(|send| async move {
            send.send(1);
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = finished_tx.send(());
        });

        let mut stream = effect.into_stream(CancellationRegistry::new());
        assert_eq!(stream.next().await, Some(1));
        drop(stream);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(finished_rx.await.is_err());
    }
}
