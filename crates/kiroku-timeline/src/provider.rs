//! Serialized timeline worker and its handles.
//!
//! One [`TimelineProvider`] exists per open conversation. It owns a tokio task
//! that holds the [`TimelineReconciler`] and is the only code that ever
//! mutates the ordered sequence. Producers hand it diff batches through an
//! unbounded mpsc queue; consumers read immutable snapshots.
//!
//! ```text
//!   DiffSubmitter (Send+Sync)   mpsc     TimelineWorker (tokio task)
//!   ┌─────────────────────┐  ───────▶  ┌───────────────────────────────┐
//!   │ .submit(batch)      │            │ TimelineReconciler            │
//!   │ .flush()            │  ◀───────  │ PaginationTracker             │
//!   └─────────────────────┘  oneshot   │ SnapshotPublisher ──▶ watch   │
//!   status ──────────────────watch───▶ │ change broadcast  ──▶ bcast   │
//!                                      └───────────────────────────────┘
//!   TimelineView (read-only) ◀── watch / broadcast
//! ```
//!
//! Batches are applied in the order they were queued, each one to completion
//! before the next is looked at. The worker never awaits in the middle of a
//! batch; it yields between batches so a busy stream can't starve the rest of
//! the runtime.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use kiroku_types::{TimelineItem, TimelineItemProxy};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info};

use crate::config::TimelineConfig;
use crate::diagnostics::{Diagnostic, SharedDiagnostics};
use crate::diff::{SharedChangeSet, TimelineChangeSet, TimelineDiff};
use crate::pagination::{BackPaginationStatus, PaginationTracker};
use crate::publisher::{SharedSnapshot, SnapshotPublisher, SnapshotSubscriber};
use crate::reconciler::{BatchOutcome, TimelineReconciler};

// ============================================================================
// Error Type
// ============================================================================

/// Errors from the provider handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    #[error("timeline provider shut down")]
    Shutdown,
}

// ============================================================================
// Commands (internal)
// ============================================================================

/// Internal command sent from DiffSubmitter → TimelineWorker via mpsc.
enum Command {
    Apply {
        batch: Vec<TimelineDiff>,
    },
    /// Reply once everything queued before this has been applied.
    Flush {
        reply: oneshot::Sender<u64>,
    },
}

// ============================================================================
// DiffSubmitter (producer side)
// ============================================================================

/// Cloneable producer handle. Every clone feeds the same FIFO queue.
#[derive(Clone)]
pub struct DiffSubmitter {
    tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl DiffSubmitter {
    /// Queue a batch. Never blocks.
    pub fn submit(&self, batch: impl IntoIterator<Item = TimelineDiff>) -> Result<(), TimelineError> {
        self.send(Command::Apply { batch: batch.into_iter().collect() })
    }

    /// Wait until every batch queued before this call has been applied and
    /// published. Returns the reconciler version at that point.
    pub async fn flush(&self) -> Result<u64, TimelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush { reply })?;
        rx.await.map_err(|_| TimelineError::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    fn send(&self, cmd: Command) -> Result<(), TimelineError> {
        if self.cancel.is_cancelled() {
            return Err(TimelineError::Shutdown);
        }
        self.tx.send(cmd).map_err(|_| TimelineError::Shutdown)
    }
}

// ============================================================================
// TimelineView (consumer side)
// ============================================================================

/// Read-only handle for the rendering layer.
#[derive(Clone)]
pub struct TimelineView {
    conversation_id: Arc<str>,
    snapshots: watch::Receiver<SharedSnapshot>,
    /// Only the worker holds a strong sender, so the channel closes with it.
    changes: broadcast::WeakSender<SharedChangeSet>,
}

impl TimelineView {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Items as of the last fully applied batch.
    pub fn current_items(&self) -> Arc<[TimelineItemProxy]> {
        self.snapshots.borrow().items.clone()
    }

    pub fn back_pagination_status(&self) -> BackPaginationStatus {
        self.snapshots.borrow().back_pagination_status
    }

    pub fn latest(&self) -> SharedSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot stream; the first `recv()` yields the current snapshot.
    pub fn updates(&self) -> SnapshotSubscriber {
        SnapshotSubscriber::new(self.snapshots.clone())
    }

    /// Element-level changes, one set per batch that changed something.
    ///
    /// `recv()` returns `Closed` once the worker has exited.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<SharedChangeSet> {
        match self.changes.upgrade() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}

// ============================================================================
// TimelineProvider (owning handle)
// ============================================================================

/// Owns the worker for one conversation. Dropping it shuts the worker down.
pub struct TimelineProvider {
    conversation_id: Arc<str>,
    submitter: DiffSubmitter,
    status_tx: Arc<watch::Sender<BackPaginationStatus>>,
    view: TimelineView,
    cancel: CancellationToken,
    /// Stream forwarders; aborted on shutdown to release engine subscriptions.
    forwarders: Vec<AbortHandle>,
    worker: Option<JoinHandle<()>>,
}

impl TimelineProvider {
    /// Spawn a worker seeded with the engine's current items.
    ///
    /// Must be called within a tokio runtime. The initial snapshot (seed
    /// items, [`BackPaginationStatus::Idle`]) is visible before this returns.
    pub fn spawn(
        conversation_id: impl Into<String>,
        initial_items: impl IntoIterator<Item = TimelineItem>,
        config: TimelineConfig,
        diagnostics: SharedDiagnostics,
    ) -> Self {
        let conversation_id: Arc<str> = Arc::from(conversation_id.into());
        let reconciler =
            TimelineReconciler::new(initial_items).with_verbose(config.log_item_identifiers);

        let items: Arc<[TimelineItemProxy]> = Arc::from(reconciler.items());
        let mut tracker = PaginationTracker::new();
        let initial = tracker.combine(items.clone(), BackPaginationStatus::Idle).unwrap_or_default();
        let publisher = SnapshotPublisher::new(initial);

        let (changes_tx, _) = broadcast::channel(config.change_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(BackPaginationStatus::Idle);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let view = TimelineView {
            conversation_id: conversation_id.clone(),
            snapshots: publisher.watcher(),
            changes: changes_tx.downgrade(),
        };

        info!(
            conversation = %conversation_id,
            items = items.len(),
            "Starting timeline worker"
        );

        let worker = TimelineWorker {
            conversation_id: conversation_id.clone(),
            reconciler,
            tracker,
            publisher,
            items,
            status: BackPaginationStatus::Idle,
            status_rx,
            changes: changes_tx,
            diagnostics,
            yield_between_batches: config.yield_between_batches,
            batches: 0,
        };
        let worker = tokio::spawn(worker.run(rx, cancel.clone()));

        Self {
            conversation_id,
            submitter: DiffSubmitter { tx, cancel: cancel.clone() },
            status_tx: Arc::new(status_tx),
            view,
            cancel,
            forwarders: Vec::new(),
            worker: Some(worker),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Read-only handle for consumers.
    pub fn view(&self) -> TimelineView {
        self.view.clone()
    }

    /// Additional producer handle.
    pub fn submitter(&self) -> DiffSubmitter {
        self.submitter.clone()
    }

    /// Queue a batch. Never blocks.
    pub fn submit(&self, batch: impl IntoIterator<Item = TimelineDiff>) -> Result<(), TimelineError> {
        self.submitter.submit(batch)
    }

    /// See [`DiffSubmitter::flush`].
    pub async fn flush(&self) -> Result<u64, TimelineError> {
        self.submitter.flush().await
    }

    /// Record the engine's latest back-pagination status.
    pub fn set_back_pagination_status(&self, status: BackPaginationStatus) {
        self.status_tx.send_replace(status);
    }

    /// Forward every batch from an engine stream until it ends or the
    /// provider shuts down. After shutdown the stream is dropped unpolled.
    pub fn attach_diff_stream<S>(&mut self, stream: S)
    where
        S: Stream<Item = Vec<TimelineDiff>> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(conversation = %self.conversation_id, "Not attaching diff stream after shutdown");
            return;
        }
        let submitter = self.submitter.clone();
        let cancel = self.cancel.clone();
        let conversation_id = self.conversation_id.clone();
        let handle = tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = stream.next() => match next {
                        Some(batch) => {
                            if submitter.submit(batch).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!(conversation = %conversation_id, "Diff stream ended");
        });
        self.forwarders.push(handle.abort_handle());
    }

    /// Forward back-pagination status updates from an engine stream.
    pub fn attach_back_pagination_stream<S>(&mut self, stream: S)
    where
        S: Stream<Item = BackPaginationStatus> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(
                conversation = %self.conversation_id,
                "Not attaching back-pagination stream after shutdown"
            );
            return;
        }
        let status_tx = self.status_tx.clone();
        let cancel = self.cancel.clone();
        let conversation_id = self.conversation_id.clone();
        let handle = tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = stream.next() => match next {
                        Some(status) => {
                            status_tx.send_replace(status);
                        }
                        None => break,
                    },
                }
            }
            debug!(conversation = %conversation_id, "Back-pagination stream ended");
        });
        self.forwarders.push(handle.abort_handle());
    }

    /// Stop accepting batches and release engine streams.
    ///
    /// A batch already being applied completes; queued ones are dropped.
    pub fn shutdown(&mut self) {
        if !self.cancel.is_cancelled() {
            info!(conversation = %self.conversation_id, "Shutting down timeline worker");
        }
        self.cancel.cancel();
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }

    /// Shut down and wait for the worker task to exit.
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.submitter.is_closed()
    }
}

impl Drop for TimelineProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// TimelineWorker (internal, runs in a spawned task)
// ============================================================================

struct TimelineWorker {
    conversation_id: Arc<str>,
    reconciler: TimelineReconciler,
    tracker: PaginationTracker,
    publisher: SnapshotPublisher,
    /// Items as last published; shared with snapshots.
    items: Arc<[TimelineItemProxy]>,
    status: BackPaginationStatus,
    status_rx: watch::Receiver<BackPaginationStatus>,
    changes: broadcast::Sender<SharedChangeSet>,
    diagnostics: SharedDiagnostics,
    yield_between_batches: bool,
    /// Batches received, for log correlation.
    batches: u64,
}

impl TimelineWorker {
    /// Process commands until cancelled or every submitter is gone.
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        let mut status_open = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = self.status_rx.changed(), if status_open => match changed {
                    Ok(()) => self.handle_status(),
                    Err(_) => status_open = false,
                },
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
            }
        }
        debug!(
            conversation = %self.conversation_id,
            batches = self.batches,
            "Timeline worker shutting down"
        );
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Apply { batch } => {
                self.apply(batch);
                if self.yield_between_batches {
                    tokio::task::yield_now().await;
                }
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.reconciler.version());
            }
        }
    }

    fn handle_status(&mut self) {
        self.status = *self.status_rx.borrow_and_update();
        debug!(conversation = %self.conversation_id, status = %self.status, "Back-pagination status");
        self.publish();
    }

    fn apply(&mut self, batch: Vec<TimelineDiff>) {
        self.batches += 1;
        let span = debug_span!(
            "process_timeline_diffs",
            conversation = %self.conversation_id,
            batch = self.batches,
            diffs = batch.len()
        );
        let _enter = span.enter();

        let outcome = self.reconciler.apply_batch(batch);
        self.report(&outcome);

        let applied = outcome.applied;
        if !outcome.changes.is_empty() {
            // No receivers is fine.
            let _ = self.changes.send(Arc::new(TimelineChangeSet {
                version: outcome.version,
                changes: outcome.changes,
            }));
        }
        if applied > 0 {
            self.items = Arc::from(self.reconciler.items());
            self.publish();
        }

        debug!(
            applied,
            items = self.reconciler.len(),
            version = self.reconciler.version(),
            "Finished applying diffs"
        );
    }

    fn publish(&mut self) {
        if let Some(snapshot) = self.tracker.combine(self.items.clone(), self.status) {
            self.publisher.publish(snapshot);
        }
    }

    fn report(&self, outcome: &BatchOutcome) {
        for unsupported in &outcome.unsupported {
            self.diagnostics.report(Diagnostic::UnsupportedOperation {
                conversation_id: self.conversation_id.to_string(),
                kind: unsupported.kind,
                diff_index: unsupported.diff_index,
            });
        }
        if let Some(abandoned) = &outcome.abandoned {
            self.diagnostics.report(Diagnostic::BatchAbandoned {
                conversation_id: self.conversation_id.to_string(),
                version: outcome.version,
                diff_index: abandoned.diff_index,
                skipped: abandoned.skipped,
                error: abandoned.error.clone(),
            });
        }
    }
}
