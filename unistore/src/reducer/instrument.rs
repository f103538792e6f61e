use crate::{ActionSender, Effect, Reducer};
use futures::FutureExt;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, debug_span, Instrument, Level};

type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Decorator that traces every action and the effects it starts.
///
/// Each `reduce` runs inside an `action` span. Returned effects run inside an
/// `effect` span and log when they start, when they send an action, and
/// whether they finished or were cancelled. Lines go to `tracing` at `DEBUG`
/// unless [`with_logger`](Instrumented::with_logger) replaced the sink; with
/// the default sink nothing is formatted unless `DEBUG` events are enabled.
pub struct Instrumented<R> {
    base: R,
    prefix: Arc<str>,
    logger: Option<Logger>,
}

impl<R: Reducer> Instrumented<R>
where
    R::Action: Debug,
{
    pub fn new(base: R, prefix: impl Into<Cow<'static, str>>) -> Self {
        let prefix = prefix.into();
        let prefix = if prefix.is_empty() {
            Arc::from("")
        } else {
            Arc::from(format!("[{prefix}] "))
        };
        Instrumented {
            base,
            prefix,
            logger: None,
        }
    }

    /// Sends the lifecycle lines to `logger` instead of `tracing`.
    pub fn with_logger(mut self, logger: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }
}

impl<R: Reducer> Reducer for Instrumented<R>
where
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
        if self.logger.is_none() && !tracing::enabled!(Level::DEBUG) {
            return self.base.reduce(state, action, dependency);
        }

        let origin: Arc<str> = Arc::from(format!("{action:?}"));
        let effect = debug_span!("action", prefix = %self.prefix, action = %origin)
            .in_scope(|| self.base.reduce(state, action, dependency));

        let prefix = self.prefix.clone();
        let log: Logger = match &self.logger {
            Some(logger) => logger.clone(),
            None => Arc::new(|line: &str| debug!("{line}")),
        };
        effect.map_body(move |body| {
            Box::new(move |send: ActionSender<R::Action>| {
                let span = debug_span!("effect", from = %origin);
                async move {
                    log(&format!("{prefix}Started from {origin}"));
                    let lifecycle = Lifecycle {
                        prefix: prefix.clone(),
                        log: log.clone(),
                        running: true,
                    };
                    let send = send.inspect({
                        let (prefix, origin) = (prefix.clone(), origin.clone());
                        move |_| log(&format!("{prefix}Output from {origin}"))
                    });
                    body(send.clone()).await;
                    lifecycle.end(send.is_cancelled());
                }
                .instrument(span)
                .boxed()
            })
        })
    }
}

/// Logs `Cancelled` if the effect is dropped before its body returns.
struct Lifecycle {
    prefix: Arc<str>,
    log: Logger,
    running: bool,
}

impl Lifecycle {
    fn end(mut self, cancelled: bool) {
        self.running = false;
        let outcome = if cancelled { "Cancelled" } else { "Finished" };
        (self.log)(&format!("{}{outcome}", self.prefix));
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.running {
            (self.log)(&format!("{}Cancelled", self.prefix));
        }
    }
}
