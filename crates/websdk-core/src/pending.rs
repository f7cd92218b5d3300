//! In-flight requests awaiting a correlated reply.
//!
//! The wire protocol carries no correlation id, so a reply is matched to its
//! request by command alone. That allows one outstanding operation per key:
//! registering a second waiter for the same key drops the first, whose
//! receiver then resolves to [`Abandoned`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

/// The waiter was dropped without a reply: superseded by a newer call for
/// the same command, or its table was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pending operation abandoned before a reply arrived")]
pub struct Abandoned;

/// One pending slot per key.
pub struct PendingTable<K, T> {
    slots: Mutex<HashMap<K, oneshot::Sender<T>>>,
}

impl<K, T> Default for PendingTable<K, T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> PendingTable<K, T>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the slot for `key`, replacing any waiter already there.
    pub fn register(&self, key: K) -> Waiter<T> {
        let (tx, rx) = oneshot::channel();
        if self.slots().insert(key, tx).is_some() {
            tracing::debug!(?key, "pending operation superseded by a newer call");
        }
        Waiter(rx)
    }

    /// Deliver `value` to the waiter for `key` and clear the slot.
    ///
    /// Returns false when nobody was waiting (late or duplicate reply) or
    /// the waiter has gone away.
    pub fn settle(&self, key: K, value: T) -> bool {
        match self.slots().remove(&key) {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self, key: K) -> bool {
        self.slots().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every waiter.
    pub fn clear(&self) {
        self.slots().clear();
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<K, oneshot::Sender<T>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Receiving half of a pending slot.
pub struct Waiter<T>(oneshot::Receiver<T>);

impl<T> Waiter<T> {
    pub async fn wait(self) -> Result<T, Abandoned> {
        self.0.await.map_err(|_| Abandoned)
    }
}
