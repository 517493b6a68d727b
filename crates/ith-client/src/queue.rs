//! Ordered queue for mutating calls that must not interleave.
//!
//! `tokio::sync::Mutex` grants the lock in request order, so calls run one
//! at a time in the order they were submitted.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

/// FIFO serializer.
#[derive(Debug, Default)]
pub struct OrderedQueue {
    lock: Mutex<()>,
    waiting: AtomicUsize,
}

impl OrderedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` after every previously submitted call has settled.
    pub async fn run<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _turn = {
            let _waiting = Waiting::enter(&self.waiting);
            self.lock.lock().await
        };
        f().await
    }

    /// Calls waiting for their turn.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

/// Counts one caller as waiting until dropped, including on cancellation.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
