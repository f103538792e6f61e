mod animation;
mod diff;
mod effect;
mod error;
mod reducer;
mod store;
pub mod test_store;

pub use animation::*;
pub use effect::*;
pub use error::*;
pub use reducer::*;
pub use store::*;

/// Values a store can hold. Every owned, cloneable, thread-safe type qualifies.
pub trait State: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> State for T {}

/// Events fed into a reducer, either from callers or from running effects.
pub trait Action: Send + 'static {}

impl<T: Send + 'static> Action for T {}

/// Injected context a reducer hands to its effects (clients, clocks, ...).
pub trait Dependency: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Dependency for T {}
