//! A deterministic harness for asserting, step by step, how a reducer and its
//! effects evolve state.
//!
//! ```
//! use unistore::test_store::TestStore;
//! use unistore::{reducer_fn, Effect};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum Action {
//!     Tap,
//!     Response(i32),
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut store = TestStore::new(
//!     0,
//!     reducer_fn(|count: &mut i32, action: Action, _: &()| match action {
//!         Action::Tap => Effect::emit(Action::Response(42)),
//!         Action::Response(value) => {
//!             *count = value;
//!             Effect::none()
//!         }
//!     }),
//!     (),
//! );
//!
//! store.send(Action::Tap).await;
//! store.receive_with(Action::Response(42), |count| *count = 42).await;
//! store.finish().await;
//! # }
//! ```

mod hook;

use crate::diff::diff_debug;
use crate::{Action, Dependency, Reducer, State, Store, TaskHandle, TestStoreError};
use hook::{Harness, Origin, TestAction, TestHook};
use std::fmt::{self, Debug};
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::Instant;

/// Default time to wait for actions and effects.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Times the harness yields to the runtime after each assertion so that
/// freshly started effects get to run.
const SETTLE_YIELDS: usize = 10;

/// A mutation applied to the previously asserted state to build the expected one.
pub type Expect<'a, S> = Box<dyn FnOnce(&mut S) + 'a>;

/// Drives a reducer through a real [`Store`] and checks every state change
/// and every action fed back by effects.
///
/// Assertions are exhaustive. Each sent or received action must be matched by
/// a state expectation. Every action an effect feeds back must be received,
/// in order. On drop, the harness panics if actions were left unasserted or
/// effects are still running, unless the test is already panicking.
pub struct TestStore<S, A, D = ()>
where
    S: State + PartialEq + Debug,
    A: Action + Clone + PartialEq + Debug,
    D: Dependency,
{
    store: Store<S, TestAction<A>, D>,
    harness: Arc<Harness<S, A>>,
    acks: UnboundedReceiver<u64>,
    next_ticket: u64,
    timeout: Duration,
    /// The last assertion made, for teardown reports.
    location: &'static Location<'static>,
    checked: bool,
}

impl<S, A, D> TestStore<S, A, D>
where
    S: State + PartialEq + Debug,
    A: Action + Clone + PartialEq + Debug,
    D: Dependency,
{
    #[track_caller]
    pub fn new<R>(initial_state: S, reducer: R, dependency: D) -> Self
    where
        R: Reducer<State = S, Action = A, Dependency = D>,
    {
        let (sender, acks) = mpsc::unbounded_channel();
        let harness = Arc::new(Harness::new(initial_state.clone(), sender));
        let store = Store::new(
            initial_state,
            TestHook::new(reducer, harness.clone()),
            dependency,
        );
        TestStore {
            store,
            harness,
            acks,
            next_ticket: 0,
            timeout: DEFAULT_TIMEOUT,
            location: Location::caller(),
            checked: false,
        }
    }

    /// The state as of the last assertion.
    pub fn state(&self) -> S {
        self.harness.ledger.lock().state.clone()
    }

    pub fn dependency(&self) -> D {
        self.store.dependency()
    }

    pub fn set_dependency(&self, dependency: D) {
        self.store.set_dependency(dependency);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes how long `receive` and `finish` wait by default.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sends `action` and asserts that it leaves the state unchanged.
    ///
    /// # Panics
    ///
    /// Panics with the [`TestStoreError`] describing the first failed check.
    #[track_caller]
    pub fn send(&mut self, action: A) -> impl Future<Output = TestTask> + '_ {
        let location = Location::caller();
        async move { or_panic(self.send_at(action, None, location).await) }
    }

    /// Sends `action` and asserts that it changes the state the way `expect`
    /// changes the previously asserted state.
    #[track_caller]
    pub fn send_with<'a>(
        &'a mut self,
        action: A,
        expect: impl FnOnce(&mut S) + 'a,
    ) -> impl Future<Output = TestTask> + 'a {
        let location = Location::caller();
        async move { or_panic(self.send_at(action, Some(Box::new(expect)), location).await) }
    }

    /// Non-panicking form of [`send`](Self::send) and [`send_with`](Self::send_with).
    #[track_caller]
    pub fn try_send<'a>(
        &'a mut self,
        action: A,
        expect: Option<Expect<'a, S>>,
    ) -> impl Future<Output = Result<TestTask, TestStoreError>> + 'a {
        let location = Location::caller();
        self.send_at(action, expect, location)
    }

    /// Asserts that the next action fed back by an effect is `action` and that
    /// it leaves the state unchanged.
    #[track_caller]
    pub fn receive(&mut self, action: A) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.receive_at(action, None, None, location).await) }
    }

    #[track_caller]
    pub fn receive_with<'a>(
        &'a mut self,
        action: A,
        expect: impl FnOnce(&mut S) + 'a,
    ) -> impl Future<Output = ()> + 'a {
        let location = Location::caller();
        async move {
            or_panic(
                self.receive_at(action, Some(Box::new(expect)), None, location)
                    .await,
            )
        }
    }

    /// Like [`receive`](Self::receive), waiting at most `timeout` for the action.
    #[track_caller]
    pub fn receive_timeout(
        &mut self,
        action: A,
        timeout: Duration,
    ) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.receive_at(action, None, Some(timeout), location).await) }
    }

    /// Non-panicking form of the `receive` assertions. A `timeout` of `None`
    /// uses the store's default.
    #[track_caller]
    pub fn try_receive<'a>(
        &'a mut self,
        action: A,
        expect: Option<Expect<'a, S>>,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), TestStoreError>> + 'a {
        let location = Location::caller();
        self.receive_at(action, expect, timeout, location)
    }

    /// Waits for every in-flight effect to complete.
    #[track_caller]
    pub fn finish(&mut self) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.finish_at(None, location).await) }
    }

    #[track_caller]
    pub fn finish_timeout(&mut self, timeout: Duration) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.finish_at(Some(timeout), location).await) }
    }

    #[track_caller]
    pub fn try_finish(
        &mut self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), TestStoreError>> + '_ {
        let location = Location::caller();
        self.finish_at(timeout, location)
    }

    /// Runs the end-of-test checks now instead of on drop.
    ///
    /// Returns the first violation: actions received but never asserted, then
    /// effects still running. Dropping the store afterwards cancels what is
    /// left without panicking.
    pub fn teardown(mut self) -> Result<(), TestStoreError> {
        self.checked = true;
        self.check_exhausted()
    }

    async fn send_at(
        &mut self,
        action: A,
        expect: Option<Expect<'_, S>>,
        location: &'static Location<'static>,
    ) -> Result<TestTask, TestStoreError> {
        self.location = location;
        let before = {
            let ledger = self.harness.ledger.lock();
            if !ledger.received.is_empty() {
                return Err(TestStoreError::UnhandledActions {
                    count: ledger.received.len(),
                    actions: pending_actions(&ledger.received),
                    location,
                });
            }
            ledger.state.clone()
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let handle = self.store.send(TestAction {
            origin: Origin::Send(action),
            location,
            ticket: Some(ticket),
        });
        self.await_ack(ticket).await;

        let actual = self.harness.ledger.lock().state.clone();
        check_state(&before, &actual, expect, location)?;
        settle().await;

        Ok(TestTask {
            handle,
            timeout: self.timeout,
        })
    }

    /// Waits until the effect of the action sent with `ticket` has started.
    async fn await_ack(&mut self, ticket: u64) {
        let deadline = Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.acks.recv()).await {
                Ok(Some(acked)) if acked >= ticket => break,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn receive_at(
        &mut self,
        expected: A,
        expect: Option<Expect<'_, S>>,
        timeout: Option<Duration>,
        location: &'static Location<'static>,
    ) -> Result<(), TestStoreError> {
        self.location = location;
        let timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + timeout;

        let (action, actual) = loop {
            let notified = self.harness.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let effects_in_flight = {
                let mut ledger = self.harness.ledger.lock();
                if let Some(next) = ledger.received.pop_front() {
                    break next;
                }
                !ledger.in_flight.is_empty()
            };

            if !effects_in_flight {
                settle().await;
                let mut ledger = self.harness.ledger.lock();
                if let Some(next) = ledger.received.pop_front() {
                    break next;
                }
                if ledger.in_flight.is_empty() {
                    return Err(TestStoreError::NothingReceived {
                        timeout,
                        effects_in_flight: false,
                        location,
                    });
                }
                continue;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut ledger = self.harness.ledger.lock();
                if let Some(next) = ledger.received.pop_front() {
                    break next;
                }
                return Err(TestStoreError::NothingReceived {
                    timeout,
                    effects_in_flight: !ledger.in_flight.is_empty(),
                    location,
                });
            }
        };

        let before = std::mem::replace(&mut self.harness.ledger.lock().state, actual.clone());
        if action != expected {
            return Err(TestStoreError::UnexpectedAction {
                expected: format!("{expected:?}"),
                received: format!("{action:?}"),
                location,
            });
        }
        check_state(&before, &actual, expect, location)?;
        settle().await;
        Ok(())
    }

    async fn finish_at(
        &mut self,
        timeout: Option<Duration>,
        location: &'static Location<'static>,
    ) -> Result<(), TestStoreError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + timeout;
        settle().await;
        loop {
            let notified = self.harness.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.harness.ledger.lock().in_flight.is_empty() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let origins = self.harness.in_flight_origins();
                if origins.is_empty() {
                    return Ok(());
                }
                return Err(TestStoreError::EffectsInFlight {
                    timeout,
                    origins,
                    location,
                });
            }
        }
    }

    fn check_exhausted(&self) -> Result<(), TestStoreError> {
        let ledger = self.harness.ledger.lock();
        if !ledger.received.is_empty() {
            return Err(TestStoreError::UnassertedActions {
                count: ledger.received.len(),
                actions: pending_actions(&ledger.received),
                location: self.location,
            });
        }
        if !ledger.in_flight.is_empty() {
            return Err(TestStoreError::EffectsStillRunning {
                origins: ledger.in_flight.values().copied().collect(),
            });
        }
        Ok(())
    }
}

impl<S, A, D> Drop for TestStore<S, A, D>
where
    S: State + PartialEq + Debug,
    A: Action + Clone + PartialEq + Debug,
    D: Dependency,
{
    fn drop(&mut self) {
        if self.checked || std::thread::panicking() {
            return;
        }
        if let Err(error) = self.check_exhausted() {
            panic!("{error}");
        }
    }
}

impl<S, A, D> fmt::Debug for TestStore<S, A, D>
where
    S: State + PartialEq + Debug,
    A: Action + Clone + PartialEq + Debug,
    D: Dependency,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestStore")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The tasks started by an action sent through a [`TestStore`].
#[derive(Debug, Clone)]
pub struct TestTask {
    handle: TaskHandle,
    timeout: Duration,
}

impl TestTask {
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the tasks and waits until they have stopped.
    pub async fn cancel(&self) {
        self.handle.cancel().await;
    }

    /// Asserts that the tasks complete within the store's timeout.
    #[track_caller]
    pub fn finish(&self) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.finish_at(self.timeout, location).await) }
    }

    #[track_caller]
    pub fn finish_timeout(&self, timeout: Duration) -> impl Future<Output = ()> + '_ {
        let location = Location::caller();
        async move { or_panic(self.finish_at(timeout, location).await) }
    }

    #[track_caller]
    pub fn try_finish(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), TestStoreError>> + '_ {
        let location = Location::caller();
        self.finish_at(timeout.unwrap_or(self.timeout), location)
    }

    async fn finish_at(
        &self,
        timeout: Duration,
        location: &'static Location<'static>,
    ) -> Result<(), TestStoreError> {
        settle().await;
        self.handle
            .finish_timeout(timeout)
            .await
            .map_err(|_| TestStoreError::TaskStillRunning { timeout, location })
    }
}

fn check_state<S: PartialEq + Debug + Clone>(
    before: &S,
    actual: &S,
    expect: Option<Expect<'_, S>>,
    location: &'static Location<'static>,
) -> Result<(), TestStoreError> {
    let modified = expect.is_some();
    let mut expected = before.clone();
    if let Some(expect) = expect {
        expect(&mut expected);
    }
    if expected != *actual {
        let diff = diff_debug(&expected, actual)
            .unwrap_or_else(|| format!("- {expected:?}\n+ {actual:?}"));
        return Err(TestStoreError::StateMismatch {
            modified,
            diff,
            location,
        });
    }
    if modified && expected == *before {
        return Err(TestStoreError::ExpectedChange { location });
    }
    Ok(())
}

fn pending_actions<A: Debug, S>(received: &std::collections::VecDeque<(A, S)>) -> String {
    let actions: Vec<&A> = received.iter().map(|(action, _)| action).collect();
    format!("{actions:#?}")
}

async fn settle() {
    for _ in 0..SETTLE_YIELDS {
        tokio::task::yield_now().await;
    }
}

fn or_panic<T>(result: Result<T, TestStoreError>) -> T {
    result.unwrap_or_else(|error| panic!("{error}"))
}
