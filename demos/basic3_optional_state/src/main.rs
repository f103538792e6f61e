use crate::tracing_setup::tracing_init;
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};
use unistore::{reducer_fn, Effect, Reducer, Store};

mod tracing_setup;

#[derive(Debug, Clone, Default, PartialEq)]
struct Screen {
    counter: Option<i32>,
}

#[derive(Debug)]
enum ScreenAction {
    Toggle,
    Counter(i32),
}

#[derive(Debug)]
enum CounterAction {
    Increment,
    IncrementLater,
}

fn screen() -> impl Reducer<State = Screen, Action = ScreenAction, Dependency = ()> {
    reducer_fn(|state: &mut Screen, action: ScreenAction, _: &()| {
        match action {
            ScreenAction::Toggle => {
                state.counter = match state.counter {
                    Some(_) => None,
                    None => Some(0),
                }
            }
            ScreenAction::Counter(count) => {
                if state.counter.is_some() {
                    state.counter = Some(count);
                }
            }
        }
        Effect::none()
    })
}

fn counter() -> impl Reducer<State = i32, Action = CounterAction, Dependency = Duration> {
    reducer_fn(|count: &mut i32, action: CounterAction, delay: &Duration| match action {
        CounterAction::Increment => {
            *count += 1;
            Effect::none()
        }
        CounterAction::IncrementLater => {
            let delay = *delay;
            Effect::task(move |send| async move {
                tokio::time::sleep(delay).await;
                send.send(CounterAction::Increment);
            })
        }
    })
}

fn attach(parent: &Store<Screen, ScreenAction>) -> Option<Store<i32, CounterAction, Duration>> {
    parent.scope_optional(
        |state: &Screen| state.counter,
        ScreenAction::Counter,
        counter(),
        Duration::from_millis(200),
    )
}

#[tokio::main]
async fn main() {
    tracing_init();

    let parent = Store::new(Screen::default(), screen(), ());

    info!("==========================================");
    warn!("A. No child store while the optional state is absent");

    match attach(&parent) {
        Some(_) => info!("  Main | counter attached"),
        None => info!("  Main | counter is not shown"),
    }

    info!("==========================================");
    warn!("B. The child store appears once the state is present");

    parent.send(ScreenAction::Toggle);
    let Some(child) = attach(&parent) else {
        warn!("  Main | counter state missing after toggle");
        return;
    };
    child.send(CounterAction::Increment);
    child.send(CounterAction::IncrementLater).finish().await;
    info!("  Main | parent: {:?}, child: {}", parent.state(), child.state());

    info!("==========================================");
    warn!("C. Dropping the child cancels its pending work");

    let pending = child.send(CounterAction::IncrementLater);
    drop(child);
    pending.finish().await;
    info!("  Main | parent after drop: {:?}", parent.state());

    info!("==========================================");
    warn!("D. A child outliving its state keeps the value seen at creation");

    let child = attach(&parent);
    parent.send(ScreenAction::Toggle);
    if let Some(child) = child {
        let mut states = child.to_stream();
        if let Some(value) = states.next().await {
            info!("  Main | child still reads {value}, parent: {:?}", parent.state());
        }
    }

    info!("  Main | Finish");
}
