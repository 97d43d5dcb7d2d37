//! Snapshot feed for observing published snapshots.
//!
//! The feed distributes each newly published snapshot to subscribers of
//! the matching library identity. Subscribing returns a channel
//! receiver; dropping the receiver unsubscribes (disconnected senders
//! are pruned on the next publish). Unsubscribing never affects an
//! in-flight sync cycle: the cycle completes and the cache stays
//! consistent for other and future callers.

use parking_lot::RwLock;
use refsync_model::{LibraryIdentity, Snapshot};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Distributes published snapshots to per-identity subscribers.
///
/// # Thread Safety
///
/// Publishing and subscribing may happen from any thread.
#[derive(Debug, Default)]
pub struct SnapshotFeed {
    subscribers: RwLock<HashMap<LibraryIdentity, Vec<Sender<Arc<Snapshot>>>>>,
}

impl SnapshotFeed {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to snapshots of one library identity.
    ///
    /// Every snapshot published after this call is delivered to the
    /// returned receiver. Drop the receiver to unsubscribe.
    pub fn subscribe(&self, identity: &LibraryIdentity) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .write()
            .entry(identity.clone())
            .or_default()
            .push(tx);
        rx
    }

    /// Publishes a snapshot to all live subscribers of an identity.
    ///
    /// Subscribers whose receiver has been dropped are removed.
    pub fn publish(&self, identity: &LibraryIdentity, snapshot: Arc<Snapshot>) {
        let mut subscribers = self.subscribers.write();
        if let Some(senders) = subscribers.get_mut(identity) {
            senders.retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
            if senders.is_empty() {
                subscribers.remove(identity);
            }
        }
    }

    /// Returns the number of live subscribers for an identity.
    ///
    /// Dropped receivers are only counted out after the next publish.
    #[must_use]
    pub fn subscriber_count(&self, identity: &LibraryIdentity) -> usize {
        self.subscribers
            .read()
            .get(identity)
            .map_or(0, |senders| senders.len())
    }
}
