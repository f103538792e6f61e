use crate::effect::{run_body, Body};
use crate::{Action, ActionSender, Animation, Dependency, Priority, TaskHandle};
use std::any::Any;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Tasks of one action that was buffered behind a running flush.
///
/// The group is a child of the flush group, so cancelling the flush also
/// cancels them. The tracker closes when the entry is dropped, which happens
/// once the action was reduced or discarded.
pub(crate) struct SendTasks {
    group: CancellationToken,
    tracker: TaskTracker,
}

impl SendTasks {
    pub(crate) fn new(flush_group: &CancellationToken) -> Self {
        SendTasks {
            group: flush_group.child_token(),
            tracker: TaskTracker::new(),
        }
    }

    pub(crate) fn handle(&self) -> TaskHandle {
        TaskHandle::new(self.group.clone(), self.tracker.clone())
    }
}

impl Drop for SendTasks {
    fn drop(&mut self) {
        self.tracker.close();
    }
}

/// Bookkeeping for one drain of a root store's action buffer.
///
/// Every task spawned while the buffer drains joins the same cancellation
/// group and tracker, which become the [`TaskHandle`] of the `send` that
/// started the flush. Tasks of a buffered action are also tracked by that
/// action's own [`SendTasks`].
pub(crate) struct Flush {
    group: CancellationToken,
    tracker: TaskTracker,
    current: Option<SendTasks>,
    spawned: usize,
    actions: usize,
    animation: Option<Animation>,
    dependencies: HashMap<usize, Box<dyn Any + Send>>,
}

impl Flush {
    pub(crate) fn new(group: CancellationToken) -> Self {
        Flush {
            group,
            tracker: TaskTracker::new(),
            current: None,
            spawned: 0,
            actions: 0,
            animation: None,
            dependencies: HashMap::new(),
        }
    }

    /// The dependency of store `node`, read once per flush.
    pub(crate) fn dependency<D: Dependency>(&mut self, node: usize, current: impl FnOnce() -> D) -> D {
        if let Some(dependency) = self
            .dependencies
            .get(&node)
            .and_then(|dependency| dependency.downcast_ref::<D>())
        {
            return dependency.clone();
        }
        let dependency = current();
        self.dependencies.insert(node, Box::new(dependency.clone()));
        dependency
    }

    /// Starts the next job of the flush. Keeps the first animation requested
    /// during the flush and closes the tasks of the previous buffered action.
    pub(crate) fn absorb(&mut self, animation: Option<Animation>, tasks: Option<SendTasks>) {
        self.actions += 1;
        if self.animation.is_none() {
            self.animation = animation;
        }
        self.current = tasks;
    }

    pub(crate) fn actions(&self) -> usize {
        self.actions
    }

    pub(crate) fn spawned(&self) -> usize {
        self.spawned
    }

    pub(crate) fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    /// Spawns an effect body. The task stops when its own token, the flush
    /// group, or `lifetime` (the owning store) is cancelled.
    pub(crate) fn spawn<A: Action>(
        &mut self,
        lifetime: &CancellationToken,
        priority: Option<Priority>,
        body: Body<A>,
        sender: impl FnOnce(CancellationToken) -> ActionSender<A>,
    ) {
        let token = match &self.current {
            Some(tasks) => tasks.group.child_token(),
            None => self.group.child_token(),
        };
        let send = sender(token.clone());
        let lifetime = lifetime.clone();
        self.spawned += 1;
        let task = async move {
            tokio::select! {
                biased;
                _ = lifetime.cancelled() => token.cancel(),
                _ = token.cancelled() => {}
                _ = run_body(priority, body, send) => {}
            }
        };
        match &self.current {
            Some(tasks) => {
                self.tracker.spawn(tasks.tracker.track_future(task));
            }
            None => {
                self.tracker.spawn(task);
            }
        }
    }

    pub(crate) fn finish(mut self) -> (TaskHandle, Option<Animation>) {
        self.current = None;
        self.tracker.close();
        let handle = if self.spawned == 0 {
            TaskHandle::default()
        } else {
            TaskHandle::new(self.group, self.tracker)
        };
        (handle, self.animation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancellationRegistry;

    #[test]
    fn test_dependency_snapshot_is_stable() {
        let mut flush = Flush::new(CancellationToken::new());
        assert_eq!(flush.dependency(1, || 10u32), 10);
        assert_eq!(flush.dependency(1, || 20u32), 10);
        assert_eq!(flush.dependency(2, || "other"), "other");
    }

    #[test]
    fn test_first_animation_wins() {
        let mut flush = Flush::new(CancellationToken::new());
        flush.absorb(None, None);
        flush.absorb(Some(Animation::linear(Default::default())), None);
        flush.absorb(Some(Animation::default()), None);
        assert_eq!(flush.actions(), 3);
        assert_eq!(flush.animation(), Some(&Animation::linear(Default::default())));

        let (handle, animation) = flush.finish();
        assert!(handle.is_finished());
        assert_eq!(animation, Some(Animation::linear(Default::default())));
    }

    fn body(work: impl std::future::Future<Output = ()> + Send + 'static) -> Body<u8> {
        use futures::FutureExt;
        Box::new(move |_: ActionSender<u8>| work.boxed())
    }

    fn sender(token: CancellationToken) -> ActionSender<u8> {
        ActionSender::new(|_, _| TaskHandle::default(), token, CancellationRegistry::new())
    }

    #[tokio::test]
    async fn test_buffered_send_tracks_only_its_tasks() {
        let group = CancellationToken::new();
        let mut flush = Flush::new(group.clone());
        let lifetime = CancellationToken::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        flush.absorb(None, None);
        flush.spawn(&lifetime, None, body(async move {
            let _ = wait.await;
        }), sender);

        let buffered = SendTasks::new(&group);
        let handle = buffered.handle();
        flush.absorb(None, Some(buffered));
        flush.spawn(&lifetime, None, body(async {}), sender);
        assert!(!handle.is_finished());

        let (all, _) = flush.finish();
        handle.finish().await;
        assert!(!all.is_finished());

        let _ = release.send(());
        all.finish().await;
    }

    #[tokio::test]
    async fn test_cancelling_the_flush_cancels_buffered_tasks() {
        let group = CancellationToken::new();
        let mut flush = Flush::new(group.clone());
        let buffered = SendTasks::new(&group);
        let handle = buffered.handle();

        flush.absorb(None, Some(buffered));
        flush.spawn(&CancellationToken::new(), None, body(std::future::pending()), sender);
        let (all, _) = flush.finish();

        all.cancel().await;
        assert!(handle.is_cancelled());
        assert!(handle.is_finished());
    }
}
