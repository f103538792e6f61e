use crate::Cancelled;
use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Values usable as a cancellation identity.
pub trait CancelKey: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

impl<T: Hash + Eq + fmt::Debug + Send + Sync + 'static> CancelKey for T {}

trait ErasedKey: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn ErasedKey) -> bool;
}

impl<K: CancelKey> ErasedKey for K {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn ErasedKey) -> bool {
        other.as_any().downcast_ref::<K>() == Some(self)
    }
}

/// A cancellation identity: a caller-chosen key qualified by the key's type.
///
/// Keys of different types never compare equal even when their raw values
/// match, so `1u32` and `1u64` name different groups of tasks.
#[derive(Clone)]
pub struct CancelId {
    owner: TypeId,
    owner_name: &'static str,
    hash: u64,
    key: Arc<dyn ErasedKey>,
}

impl CancelId {
    /// Qualifies `key` by its own type. Passing an existing `CancelId` returns it unchanged.
    pub fn new<K: CancelKey>(key: K) -> Self {
        if let Some(id) = (&key as &dyn Any).downcast_ref::<CancelId>() {
            return id.clone();
        }
        let owner = TypeId::of::<K>();
        let mut hasher = DefaultHasher::new();
        owner.hash(&mut hasher);
        key.hash(&mut hasher);
        CancelId {
            owner,
            owner_name: type_name::<K>(),
            hash: hasher.finish(),
            key: Arc::new(key),
        }
    }

    /// An identity naming a type rather than a value, for marker types such as
    /// `struct SearchRequest;`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        let mut id = CancelId::new(TypeId::of::<T>());
        id.owner_name = type_name::<T>();
        id
    }

    /// Name of the type that qualifies this identity.
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }
}

impl PartialEq for CancelId {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.hash == other.hash && self.key.eq_key(&*other.key)
    }
}

impl Eq for CancelId {}

impl Hash for CancelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self.owner_name.rsplit("::").next().unwrap_or(self.owner_name);
        write!(f, "{owner}({:?})", self.key)
    }
}

struct Entry {
    cancel: CancellationToken,
    done: CancellationToken,
}

#[derive(Default)]
struct Table {
    next: u64,
    slots: HashMap<CancelId, HashMap<u64, Entry>>,
}

/// Table of in-flight tasks grouped by [`CancelId`].
///
/// Every store tree shares one registry, reachable from effects through
/// [`ActionSender::registry`](crate::ActionSender::registry). Each mutation
/// happens under a single lock, so cancellation, registration and removal
/// are atomic with respect to each other.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    table: Arc<Mutex<Table>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every task registered under `id`. Does not wait for them to stop.
    pub fn cancel(&self, id: impl CancelKey) {
        let id = CancelId::new(id);
        let table = self.table.lock();
        let Some(slot) = table.slots.get(&id) else {
            trace!(?id, "nothing to cancel");
            return;
        };
        debug!(?id, tasks = slot.len(), "cancelling tasks");
        for entry in slot.values() {
            entry.cancel.cancel();
        }
    }

    /// Number of live tasks registered under `id`.
    pub fn count(&self, id: impl CancelKey) -> usize {
        let id = CancelId::new(id);
        self.table.lock().slots.get(&id).map_or(0, HashMap::len)
    }

    pub fn contains(&self, id: impl CancelKey) -> bool {
        self.count(id) > 0
    }

    /// True when no task is registered under any identity.
    pub fn is_empty(&self) -> bool {
        self.table.lock().slots.is_empty()
    }

    /// Runs `operation` registered under `id`, with a token derived from `parent`.
    ///
    /// With `cancel_in_flight`, every task already registered under `id` is
    /// cancelled and awaited before `operation` starts, so at most one
    /// generation per identity is ever live. Resolves to `Err(Cancelled)` when
    /// the registration is cancelled, either through [`cancel`](Self::cancel)
    /// or through `parent`, before `operation` completes.
    pub async fn with_cancellation<K, F, Fut>(
        &self,
        id: K,
        parent: &CancellationToken,
        cancel_in_flight: bool,
        operation: F,
    ) -> Result<Fut::Output, Cancelled>
    where
        K: CancelKey,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future,
    {
        let registration = tokio::select! {
            biased;
            _ = parent.cancelled() => return Err(Cancelled),
            registration = self.register(CancelId::new(id), parent, cancel_in_flight) => registration,
        };
        let token = registration.token.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            output = operation(token.clone()) => Ok(output),
        }
    }

    async fn register(
        &self,
        id: CancelId,
        parent: &CancellationToken,
        cancel_in_flight: bool,
    ) -> Registration {
        loop {
            let in_flight: Vec<CancellationToken> = {
                let mut table = self.table.lock();
                let in_flight = match table.slots.get(&id) {
                    Some(slot) if cancel_in_flight => slot
                        .values()
                        .map(|entry| {
                            entry.cancel.cancel();
                            entry.done.clone()
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                if in_flight.is_empty() {
                    let key = table.next;
                    table.next += 1;
                    let token = parent.child_token();
                    let done = CancellationToken::new();
                    table.slots.entry(id.clone()).or_default().insert(
                        key,
                        Entry {
                            cancel: token.clone(),
                            done: done.clone(),
                        },
                    );
                    trace!(?id, key, "task registered");
                    return Registration {
                        registry: self.clone(),
                        id,
                        key,
                        token,
                        done,
                    };
                }
                in_flight
            };
            debug!(?id, tasks = in_flight.len(), "waiting for in-flight tasks to stop");
            for done in in_flight {
                done.cancelled().await;
            }
        }
    }

    fn resolve(&self, id: &CancelId, key: u64) {
        let mut table = self.table.lock();
        if let Some(slot) = table.slots.get_mut(id) {
            slot.remove(&key);
            if slot.is_empty() {
                table.slots.remove(id);
            }
        }
    }
}

impl fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_map()
            .entries(table.slots.iter().map(|(id, slot)| (id, slot.len())))
            .finish()
    }
}

/// Removes its task from the registry when dropped and releases anyone
/// waiting for that task to stop.
struct Registration {
    registry: CancellationRegistry,
    id: CancelId,
    key: u64,
    token: CancellationToken,
    done: CancellationToken,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.resolve(&self.id, self.key);
        self.done.cancel();
        trace!(id = ?self.id, key = self.key, "task resolved");
    }
}
