//! # Snapshot Store
//!
//! Holds the latest fetched [`HolderInformation`] and publishes every
//! replacement to subscribers over a `tokio::sync::watch` channel.
//!
//! Replacement is wholesale and last-write-wins by fetch time. A fetched
//! snapshot whose `update_version` is lower than the stored one is still
//! adopted; the regression is logged as a warning.

use std::sync::Arc;

use tokio::sync::watch;

use ith_state::{HolderInformation, HolderView};

/// Latest snapshot, `None` until the first successful fetch.
pub type Snapshot = Option<Arc<HolderInformation>>;

/// Publish/subscribe store of the holder snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    tx: watch::Sender<Snapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The stored snapshot.
    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Decoded view of the stored snapshot.
    pub fn view(&self) -> HolderView {
        HolderView::from_snapshot(self.current())
    }

    /// Subscribe to replacements.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Replace the stored snapshot and notify subscribers.
    pub fn replace(&self, info: HolderInformation) -> Arc<HolderInformation> {
        let info = Arc::new(info);
        let previous = self.tx.send_replace(Some(Arc::clone(&info)));
        if let Some(previous) = previous {
            if info.update_version < previous.update_version {
                tracing::warn!(
                    stored = previous.update_version,
                    fetched = info.update_version,
                    "holder update_version regressed; adopting fetched snapshot"
                );
            }
        }
        info
    }

    /// Drop the stored snapshot.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}
