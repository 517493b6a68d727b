//! Single-flight cache.
//!
//! Concurrent callers of the same operation await one shared in-flight
//! future instead of issuing duplicate remote calls. The entry is removed
//! once the future settles, so the next call starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type InFlight<T> = Shared<BoxFuture<'static, T>>;

/// In-flight operations keyed by operation identity.
pub struct SingleFlight<K, T: Clone> {
    inflight: Mutex<HashMap<K, InFlight<T>>>,
}

impl<K, T: Clone> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T: Clone> std::fmt::Debug for SingleFlight<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.inflight.lock().len())
            .finish()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` unless an operation under `key` is already in flight,
    /// in which case its result is awaited instead.
    pub async fn run<F, Fut>(&self, key: K, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let fut = {
            let mut map = self.inflight.lock();
            match map.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = start().boxed().shared();
                    map.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };
        let out = fut.clone().await;
        let mut map = self.inflight.lock();
        if map.get(&key).is_some_and(|current| current.ptr_eq(&fut)) {
            map.remove(&key);
        }
        out
    }

    /// Detach every in-flight operation.
    ///
    /// Callers already awaiting a detached operation still receive its
    /// result. Later callers start a new one.
    pub fn forget_all(&self) {
        self.inflight.lock().clear();
    }

    /// Whether an operation under `key` is in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.lock().contains_key(key)
    }
}
