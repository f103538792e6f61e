use std::panic::Location;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the runtime itself.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum StoreError {
    /// Waiting on a task handle took longer than the allowed duration.
    #[error("deadline of {0:?} has elapsed!")]
    Timeout(Duration),
}

impl StoreError {
    /// Returns true if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

/// Returned by [`ActionSender::checkpoint`] once the governing task is cancelled.
///
/// Errors produced after cancellation are swallowed by [`Effect::try_task`]
/// rather than forwarded to its catch handler.
///
/// [`ActionSender::checkpoint`]: crate::ActionSender::checkpoint
/// [`Effect::try_task`]: crate::Effect::try_task
#[derive(Error, Debug, Clone, Copy, Default, Eq, PartialEq)]
#[error("Task was cancelled!")]
pub struct Cancelled;

/// Protocol violations detected by [`TestStore`](crate::test_store::TestStore).
///
/// Every variant records the source location of the assertion that failed.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum TestStoreError {
    #[error(
        "{location}: Must handle {count} received {} before sending an action: …\n\nUnhandled actions: {actions}",
        noun(.count)
    )]
    UnhandledActions {
        count: usize,
        actions: String,
        location: &'static Location<'static>,
    },

    #[error(
        "{location}: The store received {count} unexpected {} after this one: …\n\nUnhandled actions: {actions}",
        noun(.count)
    )]
    UnassertedActions {
        count: usize,
        actions: String,
        location: &'static Location<'static>,
    },

    #[error(
        "{location}: Expected to receive an action, but received none after {:.3} seconds.\n\n{}",
        .timeout.as_secs_f64(),
        receive_hint(.effects_in_flight)
    )]
    NothingReceived {
        timeout: Duration,
        effects_in_flight: bool,
        location: &'static Location<'static>,
    },

    #[error("{location}: Received unexpected action: …\n\n    Expected: {expected}\n    Received: {received}")]
    UnexpectedAction {
        expected: String,
        received: String,
        location: &'static Location<'static>,
    },

    #[error(
        "{location}: {}: …\n\n{diff}\n(Expected: -, Actual: +)",
        mismatch_title(.modified)
    )]
    StateMismatch {
        modified: bool,
        diff: String,
        location: &'static Location<'static>,
    },

    #[error(
        "{location}: Expected state to change, but no change occurred.\n\nThe expectation closure made no observable modifications to state. If no change to state is expected, use the variant without a closure."
    )]
    ExpectedChange { location: &'static Location<'static> },

    #[error(
        "{location}: Expected effects to finish, but there are still effects in-flight after {:.3} seconds.\n\nStarted by actions sent at:\n{}",
        .timeout.as_secs_f64(),
        bullet_list(.origins)
    )]
    EffectsInFlight {
        timeout: Duration,
        origins: Vec<&'static Location<'static>>,
        location: &'static Location<'static>,
    },

    #[error(
        "An effect returned for an action is still running. It must complete before the end of the test.\n\nStarted by actions sent at:\n{}\n\nAwait `finish()` at the end of the test, advance time so sleeping effects can complete, or mark long-living effects `cancellable` and cancel them.",
        bullet_list(.origins)
    )]
    EffectsStillRunning {
        origins: Vec<&'static Location<'static>>,
    },

    #[error("{location}: Expected task to finish, but it is still in-flight after {:.3} seconds.", .timeout.as_secs_f64())]
    TaskStillRunning {
        timeout: Duration,
        location: &'static Location<'static>,
    },
}

impl TestStoreError {
    /// Source location of the assertion that produced this error, when known.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            TestStoreError::UnhandledActions { location, .. }
            | TestStoreError::UnassertedActions { location, .. }
            | TestStoreError::NothingReceived { location, .. }
            | TestStoreError::UnexpectedAction { location, .. }
            | TestStoreError::StateMismatch { location, .. }
            | TestStoreError::ExpectedChange { location }
            | TestStoreError::EffectsInFlight { location, .. }
            | TestStoreError::TaskStillRunning { location, .. } => Some(location),
            TestStoreError::EffectsStillRunning { .. } => None,
        }
    }
}

fn noun(count: &usize) -> &'static str {
    if *count == 1 { "action" } else { "actions" }
}

fn mismatch_title(modified: &bool) -> &'static str {
    if *modified {
        "A state change does not match expectation"
    } else {
        "State was not expected to change, but a change occurred"
    }
}

fn receive_hint(effects_in_flight: &bool) -> &'static str {
    if *effects_in_flight {
        "There are effects in-flight. If the effect that delivers this action sleeps, make sure enough time passes for it to run (advance paused time), or configure this assertion with a longer timeout."
    } else {
        "There are no in-flight effects that could deliver this action. Could the effect you expected to deliver this action have been cancelled?"
    }
}

fn bullet_list(origins: &[&'static Location<'static>]) -> String {
    origins
        .iter()
        .map(|origin| format!("  • {origin}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error() {
        let error = StoreError::Timeout(Duration::from_millis(5));
        assert!(error.is_timeout());
        assert_eq!(error.to_string(), "deadline of 5ms has elapsed!");
    }

    #[test]
    fn test_unhandled_actions_pluralization() {
        let location = Location::caller();
        let one = TestStoreError::UnhandledActions {
            count: 1,
            actions: "[Tick]".to_string(),
            location,
        };
        assert!(one.to_string().contains("1 received action before"));

        let two = TestStoreError::UnhandledActions {
            count: 2,
            actions: "[Tick, Tock]".to_string(),
            location,
        };
        assert!(two.to_string().contains("2 received actions before"));
        assert_eq!(two.location(), Some(location));
    }

    #[test]
    fn test_nothing_received_hint() {
        let error = TestStoreError::NothingReceived {
            timeout: Duration::from_millis(100),
            effects_in_flight: false,
            location: Location::caller(),
        };
        let message = error.to_string();
        assert!(message.contains("after 0.100 seconds"));
        assert!(message.contains("no in-flight effects"));
    }

    #[test]
    fn test_effects_still_running_lists_origins() {
        let origin = Location::caller();
        let error = TestStoreError::EffectsStillRunning {
            origins: vec![origin],
        };
        assert!(error.to_string().contains(&origin.to_string()));
        assert_eq!(error.location(), None);
    }
}
