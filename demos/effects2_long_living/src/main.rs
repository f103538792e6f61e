use crate::tracing_setup::tracing_init;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use unistore::{reducer_fn, Animation, Effect, Reducer, ReducerExt, Store};

mod tracing_setup;

#[derive(Debug, Clone, Default, PartialEq)]
struct Clock {
    ticks: u32,
    running: bool,
    screenshots: u32,
}

#[derive(Debug)]
enum ClockAction {
    Start,
    Stop,
    Tick,
    ScreenshotTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Subscription {
    Timer,
    Screenshots,
}

fn ticks(interval: Duration) -> impl futures::Stream<Item = ClockAction> {
    futures::stream::unfold((), move |()| async move {
        sleep(interval).await;
        Some((ClockAction::Tick, ()))
    })
}

fn screenshots() -> impl futures::Stream<Item = ClockAction> {
    futures::stream::unfold(0u32, |taken| async move {
        if taken == 3 {
            return None;
        }
        sleep(Duration::from_millis(450)).await;
        Some((ClockAction::ScreenshotTaken, taken + 1))
    })
}

fn clock() -> impl Reducer<State = Clock, Action = ClockAction, Dependency = Duration> {
    reducer_fn(|state: &mut Clock, action: ClockAction, interval: &Duration| match action {
        ClockAction::Start => {
            state.running = true;
            Effect::merge([
                Effect::stream(ticks(*interval))
                    .animation(Animation::linear(*interval))
                    .cancellable(Subscription::Timer, true),
                Effect::stream(screenshots()).cancellable(Subscription::Screenshots, true),
            ])
        }
        ClockAction::Stop => {
            state.running = false;
            Effect::merge([
                Effect::cancel(Subscription::Timer),
                Effect::cancel(Subscription::Screenshots),
            ])
        }
        ClockAction::Tick => {
            state.ticks += 1;
            Effect::none()
        }
        ClockAction::ScreenshotTaken => {
            state.screenshots += 1;
            Effect::none()
        }
    })
}

#[tokio::main]
async fn main() {
    tracing_init();

    let store = Store::new(Clock::default(), clock().log_changes(), Duration::from_millis(200));
    let _subscription = store.on_change(|change| match change.animation {
        Some(animation) => info!("  Main | {:?} animated with {}", change.state, animation.name()),
        None => info!("  Main | {:?}", change.state),
    });

    info!("==========================================");
    warn!("A. Long-living effects keep sending until they are cancelled");

    let running = store.send(ClockAction::Start);
    sleep(Duration::from_millis(1000)).await;
    info!("  Main | registry: {:?}", store.registry());

    info!("==========================================");
    warn!("B. Cancelling by id stops them from anywhere");

    store.send(ClockAction::Stop).finish().await;
    running.finish().await;
    sleep(Duration::from_millis(500)).await;
    info!("  Main | after stop: {:?}", store.state());

    info!("==========================================");
    warn!("C. Cancelling the task handle of the starting send also stops them");

    let running = store.send(ClockAction::Start);
    sleep(Duration::from_millis(450)).await;
    running.cancel().await;
    info!("  Main | after cancelling the handle: {:?}", store.state());
    info!("  Main | registry empty: {}", store.registry().is_empty());

    info!("  Main | Finish");
}
