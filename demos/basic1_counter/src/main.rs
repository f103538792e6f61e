use crate::tracing_setup::tracing_init;
use futures::StreamExt;
use futures_signals::signal::SignalExt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use unistore::{reducer_fn, Effect, Reducer, ReducerExt, Store};

mod tracing_setup;

#[derive(Debug, Clone, Default, PartialEq)]
struct Counter {
    count: i32,
}

#[derive(Debug)]
enum CounterAction {
    Increment,
    Decrement,
    Reset,
}

fn counter() -> impl Reducer<State = Counter, Action = CounterAction, Dependency = ()> {
    reducer_fn(|state: &mut Counter, action: CounterAction, _: &()| {
        match action {
            CounterAction::Increment => state.count += 1,
            CounterAction::Decrement => state.count -= 1,
            CounterAction::Reset => state.count = 0,
        }
        Effect::none()
    })
}

#[tokio::main]
async fn main() {
    tracing_init();

    info!("==========================================");
    warn!("A. Every send is reduced and committed before it returns");

    let store = Store::new(Counter::default(), counter().log_changes(), ());
    let _subscription = store.on_change(|change| {
        info!("  Main | on_change: {:?}", change.state);
    });

    store.send(CounterAction::Increment);
    store.send(CounterAction::Increment);
    store.send(CounterAction::Decrement);
    info!("  Main | state after three sends: {:?}", store.state());

    info!("==========================================");
    warn!("B. Signals are lossy, they only report the latest state");

    let background = store.clone();
    tokio::spawn(async move {
        for _ in 0..5 {
            background.send(CounterAction::Increment);
        }
        for _ in 0..5 {
            sleep(Duration::from_millis(10)).await;
            background.send(CounterAction::Increment);
        }
    });

    store
        .to_signal()
        .map(|state| state.count)
        .to_stream()
        .take_while(|count| futures::future::ready(*count < 11))
        .for_each(|count| async move {
            info!("  Main | count is: {count}");
        })
        .await;

    info!("==========================================");
    warn!("C. Duplicate states are not published with remove_duplicates");

    let store = Store::builder(Counter::default(), counter(), ())
        .remove_duplicates()
        .build();
    let _subscription = store.on_change(|change| {
        info!("  Main | changed to {:?}", change.state);
    });
    store.send(CounterAction::Reset);
    store.send(CounterAction::Increment);
    store.send(CounterAction::Reset);
    store.send(CounterAction::Reset);

    info!("  Main | Finish");
}
