use std::borrow::Cow;
use std::time::Duration;

/// Describes how the view layer should animate the changes of a flush.
///
/// The runtime never interprets an animation. It only carries the value from
/// the `send` call (or the effect that emitted the action) to the [`Change`]
/// published when the flush commits.
///
/// [`Change`]: crate::Change
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Animation {
    name: Cow<'static, str>,
    duration: Duration,
}

impl Animation {
    pub const DEFAULT_DURATION: Duration = Duration::from_millis(350);

    pub fn new(name: impl Into<Cow<'static, str>>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    pub fn linear(duration: Duration) -> Self {
        Self::new("linear", duration)
    }

    pub fn ease_in_out(duration: Duration) -> Self {
        Self::new("ease-in-out", duration)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for Animation {
    fn default() -> Self {
        Self::new("default", Self::DEFAULT_DURATION)
    }
}
