use crate::tracing_setup::tracing_init;
use futures::StreamExt;
use tracing::{info, warn};
use unistore::{reducer_fn, Effect, Reducer, ReducerExt, Store};

mod tracing_setup;

#[derive(Debug, Clone, Default, PartialEq)]
struct TwoCounters {
    first: i32,
    second: i32,
}

#[derive(Debug)]
enum TwoCountersAction {
    First(i32),
    Second(i32),
    Swap,
}

#[derive(Debug)]
enum CounterAction {
    Increment,
    Decrement,
}

fn counter() -> impl Reducer<State = i32, Action = CounterAction, Dependency = ()> {
    reducer_fn(|count: &mut i32, action: CounterAction, _: &()| {
        match action {
            CounterAction::Increment => *count += 1,
            CounterAction::Decrement => *count -= 1,
        }
        Effect::none()
    })
}

fn two_counters() -> impl Reducer<State = TwoCounters, Action = TwoCountersAction, Dependency = ()> {
    reducer_fn(|state: &mut TwoCounters, action: TwoCountersAction, _: &()| {
        match action {
            TwoCountersAction::First(count) => state.first = count,
            TwoCountersAction::Second(count) => state.second = count,
            TwoCountersAction::Swap => std::mem::swap(&mut state.first, &mut state.second),
        }
        Effect::none()
    })
}

#[tokio::main]
async fn main() {
    tracing_init();

    let parent = Store::new(TwoCounters::default(), two_counters().log_changes(), ());
    let first = parent.scope(
        |state: &TwoCounters| state.first,
        TwoCountersAction::First,
        counter().instrument("first"),
        (),
    );
    let second = parent.scope(
        |state: &TwoCounters| state.second,
        TwoCountersAction::Second,
        counter().instrument("second"),
        (),
    );

    let _subscription = parent.on_change(|change| {
        info!("  Main | parent changed: {:?}", change.state);
    });

    info!("==========================================");
    warn!("A. Child actions are reduced by the child and embedded into the parent");

    first.send(CounterAction::Increment);
    first.send(CounterAction::Increment);
    second.send(CounterAction::Decrement);
    info!("  Main | first: {}, second: {}", first.state(), second.state());

    info!("==========================================");
    warn!("B. Children read through their projection");

    parent.send(TwoCountersAction::Swap);
    info!("  Main | first: {}, second: {}", first.state(), second.state());

    info!("==========================================");
    warn!("C. Bindings turn writes into actions");

    let first_text = first.binding(
        |count: &i32| count.to_string(),
        |text: String| match text.parse::<i32>() {
            Ok(value) if value > 0 => CounterAction::Increment,
            _ => CounterAction::Decrement,
        },
    );
    info!("  Main | binding reads {:?}", first_text.get());
    first_text.set("7".to_string());
    info!("  Main | binding reads {:?}", first_text.get());

    info!("==========================================");
    warn!("D. A child's stream only reports its own projection");

    let mut second_states = second.to_stream();
    if let Some(value) = second_states.next().await {
        info!("  Main | second is {value}");
    }
    second.send(CounterAction::Increment);
    if let Some(value) = second_states.next().await {
        info!("  Main | second is {value}");
    }

    info!("  Main | Finish");
}
