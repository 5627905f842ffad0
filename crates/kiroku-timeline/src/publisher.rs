//! Snapshot distribution to the rendering layer.
//!
//! [`SnapshotPublisher`] keeps exactly one value: the latest
//! [`TimelineSnapshot`]. Publishing replaces it and never waits on
//! subscribers, so a stalled renderer can't hold up diff application, and
//! memory stays bounded no matter how far behind a consumer is.
//!
//! A fresh [`SnapshotSubscriber`] yields the current snapshot on its first
//! `recv()`, then one value per later publish it observes. Intermediate
//! snapshots published while it wasn't looking are skipped.
//!
//! ```text
//!   worker ──publish()──▶ watch::Sender ──▶ SnapshotSubscriber (ui)
//!                               │       └──▶ SnapshotSubscriber (tests)
//!                               └─ latest()
//! ```

use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;

use crate::pagination::TimelineSnapshot;

pub type SharedSnapshot = Arc<TimelineSnapshot>;

/// Replace-latest broadcast of timeline snapshots.
#[derive(Debug)]
pub struct SnapshotPublisher {
    tx: watch::Sender<SharedSnapshot>,
}

impl SnapshotPublisher {
    pub fn new(initial: TimelineSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Replace the current snapshot and wake subscribers.
    pub fn publish(&self, snapshot: TimelineSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn latest(&self) -> SharedSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotSubscriber {
        SnapshotSubscriber::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// A receiver-side handle for read-only views.
    pub(crate) fn watcher(&self) -> watch::Receiver<SharedSnapshot> {
        self.tx.subscribe()
    }
}

/// One consumer's view of the snapshot stream.
#[derive(Debug, Clone)]
pub struct SnapshotSubscriber {
    rx: watch::Receiver<SharedSnapshot>,
    /// Whether the cold-start value has been handed out.
    primed: bool,
}

impl SnapshotSubscriber {
    pub(crate) fn new(rx: watch::Receiver<SharedSnapshot>) -> Self {
        Self { rx, primed: false }
    }

    /// Next snapshot.
    ///
    /// The first call returns the current snapshot without waiting. Returns
    /// `None` once the publisher is gone and the last value has been seen.
    pub async fn recv(&mut self) -> Option<SharedSnapshot> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// The current snapshot, without marking it seen.
    pub fn latest(&self) -> SharedSnapshot {
        self.rx.borrow().clone()
    }

    /// Adapt into a [`Stream`] with the same semantics as [`recv`](Self::recv).
    pub fn into_stream(self) -> impl Stream<Item = SharedSnapshot> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let next = sub.recv().await?;
            Some((next, sub))
        })
    }
}
