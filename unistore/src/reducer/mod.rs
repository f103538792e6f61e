mod debug;
mod instrument;

pub use debug::*;
pub use instrument::*;

use crate::{Action, Dependency, Effect, State};
use std::borrow::Cow;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// The transition function of a store.
///
/// `reduce` mutates the state in place and describes follow-up work as an
/// [`Effect`]. It must be deterministic in its inputs: clocks, randomness and
/// I/O belong in the dependency, which callers can swap for test doubles.
///
/// ```
/// use unistore::{Effect, Reducer};
///
/// struct Counter;
///
/// impl Reducer for Counter {
///     type State = i32;
///     type Action = i32;
///     type Dependency = ();
///
///     fn reduce(&self, state: &mut i32, delta: i32, _: &()) -> Effect<i32> {
///         *state += delta;
///         Effect::none()
///     }
/// }
/// ```
pub trait Reducer: Send + Sync + 'static {
    type State: State;
    type Action: Action;
    type Dependency: Dependency;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        dependency: &Self::Dependency,
    ) -> Effect<Self::Action>;
}

pub type BoxReducer<S, A, D> = Box<dyn Reducer<State = S, Action = A, Dependency = D>>;

impl<R: Reducer + ?Sized> Reducer for Box<R> {
    type State = R::State;
    type Action = R::Action;
    type Dependency = R::Dependency;

    fn reduce(&self, state: &mut R::State, action: R::Action, dependency: &R::Dependency) -> Effect<R::Action> {
        (**self).reduce(state, action, dependency)
    }
}

impl<R: Reducer + ?Sized> Reducer for Arc<R> {
    type State = R::State;
    type Action = R::Action;
    type Dependency = R::Dependency;

    fn reduce(&self, state: &mut R::State, action: R::Action, dependency: &R::Dependency) -> Effect<R::Action> {
        (**self).reduce(state, action, dependency)
    }
}

/// A reducer backed by a closure. Created by [`reducer_fn`].
pub struct FnReducer<S, A, D, F> {
    f: F,
    _marker: PhantomData<fn(&mut S, A, &D)>,
}

/// Builds a reducer from a closure.
///
/// ```
/// use unistore::{reducer_fn, Effect, Store};
///
/// let reducer = reducer_fn(|count: &mut i32, delta: i32, _: &()| {
///     *count += delta;
///     Effect::none()
/// });
/// let store = Store::new(0, reducer, ());
/// store.send(2);
/// assert_eq!(store.state(), 2);
/// ```
pub fn reducer_fn<S, A, D, F>(f: F) -> FnReducer<S, A, D, F>
where
    S: State,
    A: Action,
    D: Dependency,
    F: Fn(&mut S, A, &D) -> Effect<A> + Send + Sync + 'static,
{
    FnReducer {
        f,
        _marker: PhantomData,
    }
}

impl<S, A, D, F> Reducer for FnReducer<S, A, D, F>
where
    S: State,
    A: Action,
    D: Dependency,
    F: Fn(&mut S, A, &D) -> Effect<A> + Send + Sync + 'static,
{
    type State = S;
    type Action = A;
    type Dependency = D;

    fn reduce(&self, state: &mut S, action: A, dependency: &D) -> Effect<A> {
        (self.f)(state, action, dependency)
    }
}

/// Decorators available on every reducer.
pub trait ReducerExt: Reducer + Sized {
    /// Logs every received action and the state diff it produced, in debug builds.
    fn log_changes(self) -> LogChanges<Self>
    where
        Self::State: Debug,
        Self::Action: Debug,
    {
        LogChanges::new(self)
    }

    /// Wraps every action in a `tracing` span and logs the lifecycle of the
    /// effects it returns.
    fn instrument(self, prefix: impl Into<Cow<'static, str>>) -> Instrumented<Self>
    where
        Self::Action: Debug,
    {
        Instrumented::new(self, prefix)
    }

    fn boxed(self) -> BoxReducer<Self::State, Self::Action, Self::Dependency> {
        Box::new(self)
    }
}

impl<R: Reducer> ReducerExt for R {}
