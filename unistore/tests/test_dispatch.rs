mod common;

#[cfg(test)]
mod tests {
    use crate::common::{counter, CounterAction, Recorder};
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;
    use unistore::*;

    #[test]
    fn test_one_notification_per_flush() {
        let store = Store::new(0, counter(), ());
        let recorder = Recorder::attach(&store);

        store.send(CounterAction::Increment);
        store.send(CounterAction::Add(5));
        store.send(CounterAction::Decrement);

        assert_eq!(recorder.changes(), vec![1, 6, 5]);
    }

    #[test]
    fn test_reentrant_sends_are_buffered_into_the_running_flush() {
        let handle: Arc<OnceLock<Store<i32, u32>>> = Arc::new(OnceLock::new());
        let inner = handle.clone();
        let store = Store::new(
            0,
            reducer_fn(move |count: &mut i32, remaining: u32, _: &()| {
                *count += 1;
                if remaining > 0 {
                    if let Some(store) = inner.get() {
                        let buffered = store.send(remaining - 1);
                        assert!(!buffered.is_finished());
                    }
                }
                Effect::none()
            }),
            (),
        );
        let _ = handle.set(store.clone());
        let recorder = Recorder::attach(&store);

        store.send(3);

        assert_eq!(store.state(), 4);
        assert_eq!(recorder.changes(), vec![4]);
    }

    #[test]
    fn test_remove_duplicates_skips_unchanged_flushes() {
        let store = Store::builder(0, counter(), ()).remove_duplicates().build();
        let recorder = Recorder::attach(&store);

        store.send(CounterAction::Add(0));
        store.send(CounterAction::Increment);
        store.send(CounterAction::Add(0));

        assert_eq!(recorder.changes(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_effect_output_is_reduced_later() {
        let store = Store::new(0, counter(), ());
        let recorder = Recorder::attach(&store);

        let task = store.send(CounterAction::AddLater(10, Duration::from_secs(1)));
        assert_eq!(store.state(), 0);
        assert!(!task.is_finished());

        task.finish().await;
        assert_eq!(store.state(), 10);
        assert_eq!(recorder.changes(), vec![0, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelling_a_handle_stops_its_tasks() {
        let store = Store::new(0, counter(), ());
        let task = store.send(CounterAction::AddLater(10, Duration::from_secs(1)));
        task.cancel().await;
        assert!(task.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.state(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_to_stream_observes_latest_state() {
        use futures::StreamExt;

        let store = Store::new(0, counter(), ());
        let mut states = store.to_stream();
        assert_eq!(states.next().await, Some(0));

        store.send(CounterAction::Add(2));
        store.send(CounterAction::Add(3));
        assert_eq!(states.next().await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_on_a_loading_flag() {
        let store = Store::new(
            (false, 0),
            reducer_fn(|state: &mut (bool, i32), refresh: Option<i32>, _: &()| match refresh {
                None => {
                    state.0 = true;
                    Effect::task(|send| async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        send.send(Some(7));
                    })
                }
                Some(value) => {
                    *state = (false, value);
                    Effect::none()
                }
            }),
            (),
        );

        store.send_while(None, |(loading, _)| *loading).await;
        assert_eq!(store.state(), (false, 7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_are_all_committed_in_order() {
        let store = Store::new(0, counter(), ());
        let recorder = Recorder::attach(&store);

        let senders: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::task::spawn_blocking(move || {
                    for _ in 0..500 {
                        store.send(CounterAction::Increment);
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.await.expect("sender thread");
        }

        assert_eq!(store.state(), 4000);
        let changes = recorder.changes();
        assert_eq!(changes.last(), Some(&4000));
        assert!(changes.len() <= 4000);
        assert!(changes.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_keep_each_senders_order() {
        let store = Store::new(
            Vec::new(),
            reducer_fn(|log: &mut Vec<(usize, u32)>, entry: (usize, u32), _: &()| {
                log.push(entry);
                Effect::none()
            }),
            (),
        );

        let senders: Vec<_> = (0..4)
            .map(|thread| {
                let store = store.clone();
                tokio::task::spawn_blocking(move || {
                    for step in 0..250 {
                        store.send((thread, step));
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.await.expect("sender thread");
        }

        let log = store.state();
        assert_eq!(log.len(), 1000);
        for thread in 0..4 {
            let steps: Vec<u32> = log
                .iter()
                .filter(|(from, _)| *from == thread)
                .map(|(_, step)| *step)
                .collect();
            assert_eq!(steps, (0..250).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_a_slow_observer_never_ends_on_a_stale_state() {
        use std::sync::mpsc;

        let store = Store::new(
            0,
            reducer_fn(|value: &mut i32, next: i32, _: &()| {
                *value = next;
                Effect::none()
            }),
            (),
        );
        let (entered, wait_entered) = mpsc::sync_channel::<()>(1);
        let notified = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = notified.clone();
        let _subscription = store.on_change(move |change| {
            if *change.state == 1 {
                let _ = entered.send(());
                std::thread::sleep(Duration::from_millis(50));
            }
            log.lock().push(*change.state);
        });

        let first = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                store.send(1);
            })
        };
        let second = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                let _ = wait_entered.recv();
                store.send(2);
            })
        };
        first.await.expect("first sender");
        second.await.expect("second sender");

        assert_eq!(store.state(), 2);
        assert_eq!(*notified.lock(), vec![1, 2]);
    }
}
