use super::{run_body, Effect, Operation};
use crate::Action;

impl<A: Action> Effect<A> {
    /// Runs every effect concurrently; all bodies start at once.
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        effects.into_iter().fold(Effect::none(), Effect::merge_with)
    }

    /// Runs the effects one after the other. An effect counts as complete once
    /// its body has returned and every task started by the actions it sent has
    /// finished, so actions fed back by later effects are never reduced before
    /// the work of earlier ones. Stops early once the combined task is cancelled.
    pub fn concatenate(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        effects.into_iter().fold(Effect::none(), Effect::concatenate_with)
    }

    pub fn merge_with(self, other: Effect<A>) -> Self {
        match (self.into_operation(), other.into_operation()) {
            (Operation::None, operation) | (operation, Operation::None) => {
                Effect::from_operation(operation)
            }
            (
                Operation::Task {
                    priority: lhs_priority,
                    body: lhs,
                },
                Operation::Task {
                    priority: rhs_priority,
                    body: rhs,
                },
            ) => Effect::task(move |send| async move {
                futures::future::join(
                    run_body(lhs_priority, lhs, send.clone()),
                    run_body(rhs_priority, rhs, send),
                )
                .await;
            }),
        }
    }

    pub fn concatenate_with(self, next: Effect<A>) -> Self {
        match (self.into_operation(), next.into_operation()) {
            (Operation::None, operation) | (operation, Operation::None) => {
                Effect::from_operation(operation)
            }
            (
                Operation::Task {
                    priority: first_priority,
                    body: first,
                },
                Operation::Task {
                    priority: second_priority,
                    body: second,
                },
            ) => Effect::task(move |send| async move {
                let (tracked, sent) = send.tracking();
                run_body(first_priority, first, tracked).await;
                let started = std::mem::take(&mut *sent.lock());
                for handle in started {
                    handle.wait().await;
                }
                if send.is_cancelled() {
                    return;
                }
                run_body(second_priority, second, send).await;
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancellationRegistry;
    use futures::StreamExt;

    fn value(n: i32) -> Effect<i32> {
        Effect::task(move |send| async move {
            send.send(n);
        })
    }

    #[test]
    fn test_none_is_identity() {
        assert!(Effect::<i32>::merge([]).is_none());
        assert!(Effect::<i32>::concatenate([Effect::none(), Effect::none()]).is_none());
        assert!(!Effect::merge([Effect::none(), value(1)]).is_none());
        assert_eq!(
            Effect::concatenate([value(1), Effect::none()]).priority(),
            None
        );
        let low = Effect::<i32>::task_with_priority(crate::Priority::Low, |_| async {});
        assert_eq!(low.merge_with(Effect::none()).priority(), Some(crate::Priority::Low));
    }

    #[tokio::test]
    async fn test_concatenate_is_sequential() {
        let effect = Effect::concatenate([
            Effect::task(|send| async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                send.send(1);
            }),
            value(2),
            value(3),
        ]);
        let actions: Vec<i32> = effect.into_stream(CancellationRegistry::new()).collect().await;
        assert_eq!(actions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concatenate_waits_for_tasks_started_by_sent_actions() {
        let store = crate::Store::new(
            Vec::new(),
            crate::reducer_fn(|log: &mut Vec<&'static str>, step: &'static str, _: &()| {
                log.push(step);
                match step {
                    "a" => Effect::concatenate([value_of("b1"), value_of("c1")]),
                    "b1" => Effect::concatenate([value_of("b2"), value_of("b3")]),
                    "c1" => Effect::concatenate([value_of("c2"), value_of("c3")]),
                    _ => Effect::none(),
                }
            }),
            (),
        );

        store.send("a").finish().await;
        assert_eq!(store.state(), vec!["a", "b1", "b2", "b3", "c1", "c2", "c3"]);
    }

    fn value_of(step: &'static str) -> Effect<&'static str> {
        Effect::task(move |send| async move {
            send.send(step);
        })
    }

    #[tokio::test]
    async fn test_merge_starts_all_bodies() {
        let effect = Effect::merge([
            Effect::task(|send| async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                send.send(1);
            }),
            value(2),
        ]);
        let actions: Vec<i32> = effect.into_stream(CancellationRegistry::new()).collect().await;
        assert_eq!(actions, vec![2, 1]);
    }
}
