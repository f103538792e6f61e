use crate::tracing_setup::tracing_init;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use unistore::{reducer_fn, Effect, Reducer, ReducerExt, Store};

mod tracing_setup;

/// Stand-in for a remote service returning trivia about numbers.
#[derive(Clone)]
struct FactClient {
    fetch: Arc<dyn Fn(i32) -> Result<String, String> + Send + Sync>,
    latency: Duration,
}

impl FactClient {
    fn live() -> Self {
        FactClient {
            fetch: Arc::new(|number| match number {
                n if n < 0 => Err(format!("{n} is too negative to have a fact")),
                n => Ok(format!("{n} is a good number.")),
            }),
            latency: Duration::from_millis(300),
        }
    }

    async fn fact(&self, number: i32) -> Result<String, String> {
        sleep(self.latency).await;
        (self.fetch)(number)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Facts {
    count: i32,
    loading: bool,
    fact: Option<String>,
    error: Option<String>,
}

#[derive(Debug)]
enum FactsAction {
    Increment,
    Decrement,
    FactRequested,
    FactResponse(Result<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FactRequest;

fn facts() -> impl Reducer<State = Facts, Action = FactsAction, Dependency = FactClient> {
    reducer_fn(|state: &mut Facts, action: FactsAction, client: &FactClient| match action {
        FactsAction::Increment => {
            state.count += 1;
            state.fact = None;
            Effect::none()
        }
        FactsAction::Decrement => {
            state.count -= 1;
            state.fact = None;
            Effect::none()
        }
        FactsAction::FactRequested => {
            state.loading = true;
            state.error = None;
            let (client, number) = (client.clone(), state.count);
            Effect::try_task(
                move |send| async move {
                    let fact = client.fact(number).await?;
                    send.send(FactsAction::FactResponse(Ok(fact)));
                    Ok(())
                },
                |error: String, send| async move {
                    send.send(FactsAction::FactResponse(Err(error)));
                },
            )
            .cancellable(FactRequest, true)
        }
        FactsAction::FactResponse(Ok(fact)) => {
            state.loading = false;
            state.fact = Some(fact);
            Effect::none()
        }
        FactsAction::FactResponse(Err(error)) => {
            state.loading = false;
            state.error = Some(error);
            Effect::none()
        }
    })
}

#[tokio::main]
async fn main() {
    tracing_init();

    let store = Store::new(Facts::default(), facts().instrument("facts"), FactClient::live());
    let _subscription = store.on_change(|change| {
        info!("  Main | {:?}", change.state);
    });

    info!("==========================================");
    warn!("A. An effect feeds its result back as an action");

    store.send(FactsAction::Increment);
    store.send(FactsAction::FactRequested).finish().await;

    info!("==========================================");
    warn!("B. Failures are routed into the catch handler");

    store.send(FactsAction::Decrement);
    store.send(FactsAction::Decrement);
    store.send(FactsAction::FactRequested).finish().await;

    info!("==========================================");
    warn!("C. A new request cancels the one in flight");

    store.send(FactsAction::Increment);
    let first = store.send(FactsAction::FactRequested);
    sleep(Duration::from_millis(100)).await;
    store.send(FactsAction::Increment);
    let second = store.send(FactsAction::FactRequested);
    first.finish().await;
    second.finish().await;
    info!("  Main | only the second answer arrived: {:?}", store.state().fact);

    info!("==========================================");
    warn!("D. Swapping the dependency changes what effects see");

    store.set_dependency(FactClient {
        fetch: Arc::new(|number| Ok(format!("{number} was answered offline."))),
        latency: Duration::ZERO,
    });
    store.send(FactsAction::FactRequested).finish().await;

    info!("  Main | Finish");
}
