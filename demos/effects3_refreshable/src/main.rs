use crate::tracing_setup::tracing_init;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use unistore::{reducer_fn, Effect, Reducer, Store};

mod tracing_setup;

#[derive(Debug, Clone, Default, PartialEq)]
struct Feed {
    loading: bool,
    generation: u32,
    items: Vec<String>,
}

#[derive(Debug)]
enum FeedAction {
    Refresh,
    Loaded(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RefreshId;

fn feed() -> impl Reducer<State = Feed, Action = FeedAction, Dependency = Duration> {
    reducer_fn(|state: &mut Feed, action: FeedAction, latency: &Duration| match action {
        FeedAction::Refresh => {
            state.loading = true;
            state.generation += 1;
            let (latency, generation) = (*latency, state.generation);
            Effect::task(move |send| async move {
                sleep(latency).await;
                let items = (1..=3).map(|n| format!("story {generation}.{n}")).collect();
                send.send(FeedAction::Loaded(items));
            })
            .cancellable(RefreshId, true)
        }
        FeedAction::Loaded(items) => {
            state.loading = false;
            state.items = items;
            Effect::none()
        }
    })
}

#[tokio::main]
async fn main() {
    tracing_init();

    let store = Store::new(Feed::default(), feed(), Duration::from_millis(300));

    info!("==========================================");
    warn!("A. Pull to refresh: wait while the feed is loading");

    store.send_while(FeedAction::Refresh, |feed| feed.loading).await;
    info!("  Main | refreshed: {:?}", store.state().items);

    info!("==========================================");
    warn!("B. Giving up early cancels the refresh");

    let result = store
        .send_while_timeout(FeedAction::Refresh, |feed| feed.loading, Duration::from_millis(100))
        .await;
    info!("  Main | result: {result:?}");
    sleep(Duration::from_millis(500)).await;
    info!("  Main | still loading, items unchanged: {:?}", store.state());

    info!("==========================================");
    warn!("C. A slow backend with a new dependency");

    store.set_dependency(Duration::from_millis(800));
    let refresh = store.send(FeedAction::Refresh);
    match refresh.finish_timeout(Duration::from_millis(200)).await {
        Ok(()) => info!("  Main | finished in time"),
        Err(error) => info!("  Main | {error}, waiting for the rest"),
    }
    refresh.finish().await;
    info!("  Main | refreshed: {:?}", store.state().items);

    info!("  Main | Finish");
}
