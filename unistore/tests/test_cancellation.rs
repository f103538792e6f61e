#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use unistore::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct SearchId;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct TimerId;

    #[derive(Debug)]
    enum Action {
        Search(u32),
        Response(u32),
        StartTimer,
        StopTimer,
        Tick,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Screen {
        responses: Vec<u32>,
        ticks: u32,
    }

    fn screen() -> impl Reducer<State = Screen, Action = Action, Dependency = ()> {
        reducer_fn(|state: &mut Screen, action: Action, _: &()| match action {
            Action::Search(query) => Effect::task(move |send| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                send.send(Action::Response(query));
            })
            .cancellable(SearchId, true),
            Action::Response(query) => {
                state.responses.push(query);
                Effect::none()
            }
            Action::StartTimer => Effect::task(|send| async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    send.send(Action::Tick);
                }
            })
            .cancellable(TimerId, false),
            Action::StopTimer => Effect::cancel(TimerId),
            Action::Tick => {
                state.ticks += 1;
                Effect::none()
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_keeps_only_the_latest() {
        let store = Store::new(Screen::default(), screen(), ());
        let first = store.send(Action::Search(1));
        tokio::task::yield_now().await;
        let second = store.send(Action::Search(2));

        second.finish().await;
        first.finish().await;

        assert_eq!(store.state().responses, vec![2]);
        assert!(store.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_id_stops_a_long_living_effect() {
        let store = Store::new(Screen::default(), screen(), ());
        let timer = store.send(Action::StartTimer);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(store.state().ticks, 3);
        assert!(store.registry().contains(TimerId));

        store.send(Action::StopTimer).finish().await;
        timer.finish().await;
        assert!(timer.is_finished());
        assert!(!store.registry().contains(TimerId));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.state().ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_can_be_shared_between_stores() {
        let registry = CancellationRegistry::new();
        let store = Store::builder(Screen::default(), screen(), ())
            .registry(registry.clone())
            .build();
        let _timer = store.send(Action::StartTimer);
        tokio::task::yield_now().await;
        assert_eq!(registry.count(TimerId), 1);

        registry.cancel(TimerId);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.state().ticks, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_cancellation_is_a_no_op() {
        let smuggled: Arc<Mutex<Option<ActionSender<u32>>>> = Arc::new(Mutex::new(None));
        let slot = smuggled.clone();
        let store = Store::new(
            0,
            reducer_fn(move |count: &mut u32, action: u32, _: &()| {
                if action == 0 {
                    let slot = slot.clone();
                    Effect::task(move |send| async move {
                        *slot.lock() = Some(send.clone());
                        send.cancelled().await;
                    })
                } else {
                    *count += action;
                    Effect::none()
                }
            }),
            (),
        );

        let task = store.send(0);
        tokio::task::yield_now().await;
        let sender = smuggled.lock().take().expect("effect started");
        assert!(!sender.is_cancelled());
        assert_eq!(sender.checkpoint(), Ok(()));

        task.cancel().await;
        assert!(sender.is_cancelled());
        assert_eq!(sender.checkpoint(), Err(Cancelled));

        let handle = sender.send(5);
        assert!(handle.is_finished());
        assert_eq!(store.state(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_try_task_skips_catch() {
        let store = Store::new(
            Vec::<&'static str>::new(),
            reducer_fn(|log: &mut Vec<&'static str>, action: &'static str, _: &()| {
                if action == "load" {
                    Effect::try_task(
                        |send| async move {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            send.checkpoint()?;
                            Ok(())
                        },
                        |_: Cancelled, send| async move {
                            send.send("failed");
                        },
                    )
                } else {
                    log.push(action);
                    Effect::none()
                }
            }),
            (),
        );

        let task = store.send("load");
        tokio::task::yield_now().await;
        task.signal_cancellation();
        task.finish().await;

        assert!(store.state().is_empty());
    }
}
