use crate::StoreError;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;

/// Handle to the tasks started by one `send`.
///
/// Cancelling the handle cancels every task started while processing the
/// action, including tasks started by actions those tasks fed back during
/// the same flush. A default handle tracks nothing and is already finished.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    inner: Option<Tasks>,
}

#[derive(Debug, Clone)]
struct Tasks {
    group: CancellationToken,
    tracker: TaskTracker,
}

impl TaskHandle {
    pub(crate) fn new(group: CancellationToken, tracker: TaskTracker) -> Self {
        TaskHandle {
            inner: Some(Tasks { group, tracker }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.as_ref().is_some_and(|tasks| tasks.group.is_cancelled())
    }

    /// True once every tracked task has completed.
    pub fn is_finished(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(true, |tasks| tasks.tracker.is_closed() && tasks.tracker.is_empty())
    }

    /// Signals cancellation without waiting for the tasks to stop.
    pub fn signal_cancellation(&self) {
        if let Some(tasks) = &self.inner {
            tasks.group.cancel();
        }
    }

    /// Cancels the tasks and waits until they have stopped.
    pub async fn cancel(&self) {
        if let Some(tasks) = &self.inner {
            tasks.group.cancel();
            tasks.tracker.wait().await;
        }
    }

    /// Waits for the tasks to complete.
    ///
    /// Dropping the returned future before it completes cancels the tasks.
    pub async fn finish(&self) {
        if let Some(tasks) = &self.inner {
            let guard = tasks.group.clone().drop_guard();
            tasks.tracker.wait().await;
            guard.disarm();
        }
    }

    /// Waits for the tasks to complete without cancelling them if dropped.
    pub(crate) async fn wait(&self) {
        if let Some(tasks) = &self.inner {
            tasks.tracker.wait().await;
        }
    }

    /// A guard that cancels the tasks when dropped, unless disarmed.
    pub(crate) fn cancel_on_drop(&self) -> Option<DropGuard> {
        self.inner
            .as_ref()
            .map(|tasks| tasks.group.clone().drop_guard())
    }

    /// Waits at most `timeout` for the tasks to complete, leaving them running on timeout.
    pub async fn finish_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        match &self.inner {
            None => Ok(()),
            Some(tasks) => tokio::time::timeout(timeout, tasks.tracker.wait())
                .await
                .map_err(|_| StoreError::Timeout(timeout)),
        }
    }
}
