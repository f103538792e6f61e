#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use std::time::Duration;
    use unistore::*;

    fn sequence(values: &'static [i32], pause: Duration) -> Effect<i32> {
        Effect::task(move |send| async move {
            for value in values {
                tokio::time::sleep(pause).await;
                send.send(*value);
            }
        })
    }

    async fn collect(effect: Effect<i32>) -> Vec<i32> {
        effect.into_stream(CancellationRegistry::new()).collect().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_is_identity_for_merge_and_concatenate() {
        let pause = Duration::from_millis(10);
        let expected = collect(sequence(&[1, 2, 3], pause)).await;

        for effect in [
            Effect::merge([sequence(&[1, 2, 3], pause), Effect::none()]),
            Effect::merge([Effect::none(), sequence(&[1, 2, 3], pause)]),
            Effect::concatenate([sequence(&[1, 2, 3], pause), Effect::none()]),
            Effect::concatenate([Effect::none(), sequence(&[1, 2, 3], pause)]),
        ] {
            assert_eq!(effect.priority(), None);
            assert_eq!(collect(effect).await, expected);
        }

        assert!(Effect::<i32>::merge([Effect::none(), Effect::none()]).is_none());
        assert!(Effect::<i32>::concatenate([]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_interleaves_and_concatenate_does_not() {
        let fast = || sequence(&[1, 2], Duration::from_millis(10));
        let slow = || sequence(&[10, 20], Duration::from_millis(15));

        assert_eq!(
            collect(Effect::merge([fast(), slow()])).await,
            vec![1, 10, 2, 20]
        );
        assert_eq!(
            collect(Effect::concatenate([slow(), fast()])).await,
            vec![10, 20, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_map_transforms_every_action() {
        let effect = sequence(&[1, 2], Duration::ZERO).map(|value| value * 100);
        assert_eq!(collect(effect).await, vec![100, 200]);
        assert!(Effect::<i32>::none().map(|value| value + 1).is_none());
    }

    #[tokio::test]
    async fn test_stream_effect_forwards_items() {
        let effect = Effect::stream(futures::stream::iter(vec![4, 5, 6]));
        assert_eq!(collect(effect).await, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_try_task_routes_errors_to_catch() {
        let effect: Effect<i32> = Effect::try_task(
            |send| async move {
                send.send(1);
                Err::<(), _>("offline")
            },
            |error, send| async move {
                send.send(error.len() as i32);
            },
        );
        assert_eq!(collect(effect).await, vec![1, 7]);
    }

    #[tokio::test]
    async fn test_low_priority_runs_after_queued_work() {
        let effect = Effect::merge([
            Effect::task_with_priority(Priority::Low, |send| async move {
                send.send(2);
            }),
            Effect::task_with_priority(Priority::High, |send| async move {
                send.send(1);
            }),
        ]);
        assert_eq!(collect(effect).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_cancels_the_effect() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        struct SetOnDrop(Arc<AtomicBool>);

        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let started = Arc::new(tokio::sync::Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let (notify, guard) = (started.clone(), SetOnDrop(stopped.clone()));
        let effect: Effect<i32> = Effect::task(move |_| async move {
            let _guard = guard;
            notify.notify_one();
            std::future::pending::<()>().await;
        });

        let stream = effect.into_stream(CancellationRegistry::new());
        started.notified().await;
        assert!(!stopped.load(Ordering::SeqCst));
        drop(stream);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(stopped.load(Ordering::SeqCst));
    }
}
