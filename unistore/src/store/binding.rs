use super::Store;
use crate::{Action, Dependency, State};
use std::fmt;
use std::sync::Arc;

/// A read/write accessor pair for two-way UI controls.
///
/// Reading evaluates the getter against the current state. Writing turns the
/// value into an action and sends it.
pub struct Binding<V> {
    get: Arc<dyn Fn() -> V + Send + Sync>,
    set: Arc<dyn Fn(V) + Send + Sync>,
}

impl<V> Clone for Binding<V> {
    fn clone(&self) -> Self {
        Binding {
            get: self.get.clone(),
            set: self.set.clone(),
        }
    }
}

impl<V: 'static> Binding<V> {
    pub fn new(
        get: impl Fn() -> V + Send + Sync + 'static,
        set: impl Fn(V) + Send + Sync + 'static,
    ) -> Self {
        Binding {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// A binding that always reads `value` and ignores writes.
    pub fn constant(value: V) -> Self
    where
        V: Clone + Send + Sync,
    {
        Binding::new(move || value.clone(), |_| {})
    }

    pub fn get(&self) -> V {
        (self.get)()
    }

    pub fn set(&self, value: V) {
        (self.set)(value)
    }

    /// Derives a binding to another value through a pair of conversions.
    pub fn map<W: 'static>(
        self,
        to: impl Fn(V) -> W + Send + Sync + 'static,
        from: impl Fn(W) -> V + Send + Sync + 'static,
    ) -> Binding<W> {
        let (get, set) = (self.get, self.set);
        Binding::new(move || to(get()), move |value| set(from(value)))
    }
}

impl<V: fmt::Debug> fmt::Debug for Binding<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Binding").field(&(self.get)()).finish()
    }
}

impl<S: State, A: Action, D: Dependency> Store<S, A, D> {
    /// A binding reading `get(state)` and sending `set(value)` on write.
    pub fn binding<V: 'static>(
        &self,
        get: impl Fn(&S) -> V + Send + Sync + 'static,
        set: impl Fn(V) -> A + Send + Sync + 'static,
    ) -> Binding<V> {
        let reader = self.clone();
        let writer = self.clone();
        Binding::new(
            move || reader.with_state(&get),
            move |value| {
                writer.send(set(value));
            },
        )
    }
}
