use crate::{ActionSender, Effect, Reducer};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::panic::Location;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

/// An action tagged with where it came from.
pub(crate) struct TestAction<A> {
    pub(crate) origin: Origin<A>,
    /// The assertion that sent this action, or that sent the action whose
    /// effect produced it.
    pub(crate) location: &'static Location<'static>,
    /// Set on externally sent actions; acknowledged once their effect started.
    pub(crate) ticket: Option<u64>,
}

pub(crate) enum Origin<A> {
    Send(A),
    Receive(A),
}

pub(crate) struct Ledger<S, A> {
    /// State as of the last assertion.
    pub(crate) state: S,
    pub(crate) received: VecDeque<(A, S)>,
    pub(crate) in_flight: BTreeMap<u64, &'static Location<'static>>,
    next_effect: u64,
}

/// State shared between a [`TestStore`](super::TestStore) and its hook reducer.
pub(crate) struct Harness<S, A> {
    pub(crate) ledger: Mutex<Ledger<S, A>>,
    /// Woken whenever an action is received or an effect completes.
    pub(crate) changed: Notify,
    acks: UnboundedSender<u64>,
}

impl<S, A> Harness<S, A> {
    pub(crate) fn new(state: S, acks: UnboundedSender<u64>) -> Self {
        Harness {
            ledger: Mutex::new(Ledger {
                state,
                received: VecDeque::new(),
                in_flight: BTreeMap::new(),
                next_effect: 0,
            }),
            changed: Notify::new(),
            acks,
        }
    }

    pub(crate) fn in_flight_origins(&self) -> Vec<&'static Location<'static>> {
        self.ledger.lock().in_flight.values().copied().collect()
    }

    fn track(self: &Arc<Self>, location: &'static Location<'static>) -> InFlight<S, A> {
        let mut ledger = self.ledger.lock();
        let id = ledger.next_effect;
        ledger.next_effect += 1;
        ledger.in_flight.insert(id, location);
        InFlight {
            harness: self.clone(),
            id,
        }
    }

    fn ack(&self, ticket: Option<u64>) -> Ack {
        Ack {
            ticket,
            acks: self.acks.clone(),
        }
    }
}

/// Marks an effect in flight until dropped.
struct InFlight<S, A> {
    harness: Arc<Harness<S, A>>,
    id: u64,
}

impl<S, A> Drop for InFlight<S, A> {
    fn drop(&mut self) {
        self.harness.ledger.lock().in_flight.remove(&self.id);
        self.harness.changed.notify_waiters();
    }
}

/// Acknowledges a sent action when dropped.
struct Ack {
    ticket: Option<u64>,
    acks: UnboundedSender<u64>,
}

impl Drop for Ack {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket {
            let _ = self.acks.send(ticket);
        }
    }
}

/// Wraps the reducer under test and records every action passing through it.
pub(crate) struct TestHook<R: Reducer> {
    reducer: R,
    harness: Arc<Harness<R::State, R::Action>>,
}

impl<R: Reducer> TestHook<R> {
    pub(crate) fn new(reducer: R, harness: Arc<Harness<R::State, R::Action>>) -> Self {
        TestHook { reducer, harness }
    }
}

impl<R> Reducer for TestHook<R>
where
    R: Reducer,
    R::Action: Clone,
{
    type State = R::State;
    type Action = TestAction<R::Action>;
    type Dependency = R::Dependency;

    fn reduce(
        &self,
        state: &mut R::State,
        action: TestAction<R::Action>,
        dependency: &R::Dependency,
    ) -> Effect<TestAction<R::Action>> {
        let TestAction {
            origin,
            location,
            ticket,
        } = action;
        let (action, received) = match origin {
            Origin::Send(action) => (action, None),
            Origin::Receive(action) => {
                let received = action.clone();
                (action, Some(received))
            }
        };

        let effect = self.reducer.reduce(state, action, dependency);
        {
            let mut ledger = self.harness.ledger.lock();
            match received {
                None => ledger.state = state.clone(),
                Some(action) => ledger.received.push_back((action, state.clone())),
            }
        }
        self.harness.changed.notify_waiters();

        let ack = self.harness.ack(ticket);
        if effect.is_none() {
            return Effect::none();
        }

        let in_flight = self.harness.track(location);
        effect
            .map_body(move |body| {
                Box::new(move |send: ActionSender<R::Action>| {
                    async move {
                        drop(ack);
                        let _in_flight = in_flight;
                        body(send).await;
                    }
                    .boxed()
                })
            })
            .map(move |action| TestAction {
                origin: Origin::Receive(action),
                location,
                ticket: None,
            })
    }
}
