use crate::diff::diff_debug;
use crate::{Effect, Reducer};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

type Printer<S> = Arc<dyn Fn(&str, &S, &S) + Send + Sync>;

/// Decorator that reports each received action and the resulting state change.
///
/// Printing only happens in builds with `debug_assertions`; release builds
/// forward straight to the wrapped reducer.
pub struct LogChanges<R: Reducer> {
    base: R,
    printer: Option<Printer<R::State>>,
}

impl<R> LogChanges<R>
where
    R: Reducer,
    R::State: Debug,
    R::Action: Debug,
{
    pub fn new(base: R) -> Self {
        LogChanges {
            base,
            printer: Some(Arc::new(log_change::<R::State>)),
        }
    }

    /// Replaces the default printer. The printer gets the pretty-printed
    /// action, the state before and the state after the reducer ran.
    pub fn with_printer(
        mut self,
        printer: impl Fn(&str, &R::State, &R::State) + Send + Sync + 'static,
    ) -> Self {
        self.printer = Some(Arc::new(printer));
        self
    }

    /// Keeps the decorator in place but prints nothing.
    pub fn silent(mut self) -> Self {
        self.printer = None;
        self
    }
}

fn log_change<S: Debug>(action: &str, old: &S, new: &S) {
    debug!("{}", render_change(action, old, new));
}

fn render_change<S: Debug>(action: &str, old: &S, new: &S) -> String {
    let changes = diff_debug(old, new).unwrap_or_else(|| "  (No state changes)".to_string());
    format!("received action:\n  {action}\n{changes}")
}

impl<R> Reducer for LogChanges<R>
where
    R: Reducer,
    R::State: Debug,
    R::Action: Debug,
{
    type State = R::State;
    type Action = R::Action;
    type Dependency = R::Dependency;

    fn reduce(
        &self,
        state: &mut R::State,
        action: R::Action,
        dependency: &R::Dependency,
    ) -> Effect<R::Action> {
        match &self.printer {
            Some(printer) if cfg!(debug_assertions) => {
                let received = format!("{action:#?}");
                let old = state.clone();
                let effect = self.base.reduce(state, action, dependency);
                printer(&received, &old, state);
                effect
            }
            _ => self.base.reduce(state, action, dependency),
        }
    }
}
