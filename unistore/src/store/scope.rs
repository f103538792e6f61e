use super::observe::{Change, Observer, Subscription};
use super::{Equivalence, Flush, Job, Source, StateHost, Store, StoreBuilder};
use crate::{Action, Animation, CancellationRegistry, Dependency, Reducer, State, TaskHandle};
use futures_signals::signal::{BoxSignal, SignalExt};
use parking_lot::Mutex;
use std::sync::Arc;

/// Links a scoped store to its parent: reads project the parent's state,
/// writes run inside the parent's flush and are embedded back as a parent action.
struct ScopeLink<PS: State, PA: Action, PD: Dependency, S> {
    parent: Store<PS, PA, PD>,
    project: Arc<dyn Fn(&PS) -> S + Send + Sync>,
    embed: Arc<dyn Fn(S) -> PA + Send + Sync>,
    equivalence: Option<Equivalence<S>>,
}

impl<PS, PA, PD, S> StateHost<S> for ScopeLink<PS, PA, PD, S>
where
    PS: State,
    PA: Action,
    PD: Dependency,
    S: State,
{
    fn schedule(&self, job: Job<S>, animation: Option<Animation>) -> TaskHandle {
        let parent = self.parent.node.clone();
        let project = self.project.clone();
        let embed = self.embed.clone();
        self.parent.node.host.schedule(
            Box::new(move |state: &mut PS, flush: &mut Flush| {
                let mut child = project(state);
                job(&mut child, flush);
                parent.reduce_in_flush(state, embed(child), flush);
            }),
            animation,
        )
    }

    fn snapshot(&self) -> S {
        (self.project)(&self.parent.node.host.snapshot())
    }

    fn registry(&self) -> &CancellationRegistry {
        self.parent.node.host.registry()
    }

    fn signal(&self) -> BoxSignal<'static, S> {
        let project = self.project.clone();
        self.parent
            .node
            .host
            .signal()
            .map(move |state| project(&state))
            .boxed()
    }

    fn observe(&self, observer: Observer<S>) -> Subscription {
        let project = self.project.clone();
        let equivalence = self.equivalence.clone();
        let last = Mutex::new(self.snapshot());
        self.parent
            .node
            .host
            .observe(Arc::new(move |change: &Change<'_, PS>| {
                let state = project(change.state);
                {
                    let mut last = last.lock();
                    if let Some(equivalent) = &equivalence {
                        if equivalent(&*last, &state) {
                            return;
                        }
                    }
                    *last = state.clone();
                }
                observer(&Change {
                    state: &state,
                    animation: change.animation,
                });
            }))
    }
}

impl<S: State, A: Action, D: Dependency> Store<S, A, D> {
    /// Derives a child store whose state is `project(parent state)`.
    ///
    /// Child actions are reduced inside the parent's flush against the freshest
    /// parent state. The resulting child state is handed to `embed`, and the
    /// parent action it produces is reduced right after. Dropping the child
    /// cancels the tasks it started, and only those.
    pub fn scope<R>(
        &self,
        project: impl Fn(&S) -> R::State + Send + Sync + 'static,
        embed: impl Fn(R::State) -> A + Send + Sync + 'static,
        reducer: R,
        dependency: R::Dependency,
    ) -> Store<R::State, R::Action, R::Dependency>
    where
        R: Reducer,
    {
        self.scope_builder(project, embed, reducer, dependency).build()
    }

    /// Like [`scope`](Self::scope), returning a builder to configure the child.
    pub fn scope_builder<R>(
        &self,
        project: impl Fn(&S) -> R::State + Send + Sync + 'static,
        embed: impl Fn(R::State) -> A + Send + Sync + 'static,
        reducer: R,
        dependency: R::Dependency,
    ) -> StoreBuilder<R::State, R::Action, R::Dependency>
    where
        R: Reducer,
    {
        let parent = self.clone();
        let attach = move |equivalence: Option<Equivalence<R::State>>| {
            let lifetime = parent.node.lifetime.child_token();
            let host: Box<dyn StateHost<R::State>> = Box::new(ScopeLink {
                parent,
                project: Arc::new(project),
                embed: Arc::new(embed),
                equivalence,
            });
            (host, lifetime)
        };
        StoreBuilder::with_source(Source::Scope(Box::new(attach)), Arc::new(reducer), dependency)
    }

    /// Derives a child store from optional state, or `None` when the state is absent.
    ///
    /// The child keeps working if the parent's value later becomes `None`: it
    /// then reads the value observed when it was created.
    pub fn scope_optional<R>(
        &self,
        project: impl Fn(&S) -> Option<R::State> + Send + Sync + 'static,
        embed: impl Fn(R::State) -> A + Send + Sync + 'static,
        reducer: R,
        dependency: R::Dependency,
    ) -> Option<Store<R::State, R::Action, R::Dependency>>
    where
        R: Reducer,
    {
        let fallback = self.with_state(&project)?;
        Some(self.scope(
            move |state| project(state).unwrap_or_else(|| fallback.clone()),
            embed,
            reducer,
            dependency,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reducer_fn, Effect};

    fn parent() -> Store<i32, i32> {
        Store::new(
            0,
            reducer_fn(|count: &mut i32, value: i32, _: &()| {
                *count = value;
                Effect::none()
            }),
            (),
        )
    }

    #[test]
    fn test_child_reads_through_projection() {
        let parent = parent();
        let child = parent.scope(
            |count: &i32| count.to_string(),
            |text: String| text.parse().unwrap_or_default(),
            reducer_fn(|_: &mut String, _: (), _: &()| Effect::none()),
            (),
        );
        assert_eq!(child.state(), "0");
        parent.send(1);
        assert_eq!(child.state(), "1");
    }

    #[test]
    fn test_child_writes_are_embedded() {
        let parent = parent();
        let child = parent.scope(
            |count: &i32| *count,
            |count: i32| count,
            reducer_fn(|count: &mut i32, delta: i32, _: &()| {
                *count += delta;
                Effect::none()
            }),
            (),
        );
        child.send(5);
        child.send(2);
        assert_eq!(parent.state(), 7);
        assert_eq!(child.state(), 7);
        assert!(child.registry().is_empty());
    }

    #[test]
    fn test_scope_optional_falls_back() {
        let parent = Store::new(
            Some(3),
            reducer_fn(|value: &mut Option<i32>, next: Option<i32>, _: &()| {
                *value = next;
                Effect::none()
            }),
            (),
        );
        let child = parent
            .scope_optional(
                |value: &Option<i32>| *value,
                Some,
                reducer_fn(|_: &mut i32, _: (), _: &()| Effect::none()),
                (),
            )
            .expect("parent holds a value");

        parent.send(None);
        assert_eq!(child.state(), 3);
        parent.send(Some(4));
        assert_eq!(child.state(), 4);

        let empty = parent.clone();
        empty.send(None);
        assert!(empty
            .scope_optional(
                |value: &Option<i32>| *value,
                Some,
                reducer_fn(|_: &mut i32, _: (), _: &()| Effect::none()),
                (),
            )
            .is_none());
    }

    #[test]
    fn test_child_observer_dedupes() {
        let parent = Store::new(
            (0, 0),
            reducer_fn(|pair: &mut (i32, i32), (a, b): (i32, i32), _: &()| {
                *pair = (a, b);
                Effect::none()
            }),
            (),
        );
        let child = parent
            .scope_builder(
                |pair: &(i32, i32)| pair.0,
                |_: i32| (0, 0),
                reducer_fn(|_: &mut i32, _: (), _: &()| Effect::none()),
                (),
            )
            .remove_duplicates()
            .build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _subscription = child.on_change(move |change| log.lock().push(*change.state));

        parent.send((0, 1));
        parent.send((2, 1));
        parent.send((2, 5));

        assert_eq!(*seen.lock(), vec![2]);
    }
}
