//! Timeline reconciliation for kiroku conversations.
//!
//! Folds the sync engine's diff stream into an ordered, identity-stable
//! sequence of renderable items and publishes immutable snapshots of it.
//!
//! - [`TimelineReconciler`]: pure diff application (no tasks, no channels).
//! - [`TimelineProvider`]: per-conversation worker that serializes batches and
//!   publishes [`TimelineSnapshot`]s.
//! - [`TimelineView`]: read-only consumer handle.
//!
//! Must be used within a tokio runtime.

pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod diff;
pub mod pagination;
pub mod provider;
pub mod publisher;
pub mod reconciler;

pub use config::{ConfigError, TimelineConfig};
pub use diagnostics::{
    Diagnostic, DiagnosticsSink, NoopDiagnostics, RecordingDiagnostics, SharedDiagnostics,
    TracingDiagnostics,
};
pub use diff::{DiffKind, SharedChangeSet, TimelineChange, TimelineChangeSet, TimelineDiff};
pub use pagination::{BackPaginationStatus, PaginationTracker, TimelineSnapshot};
pub use provider::{DiffSubmitter, TimelineError, TimelineProvider, TimelineView};
pub use publisher::{SharedSnapshot, SnapshotPublisher, SnapshotSubscriber};
pub use reconciler::{
    AbandonedDiff, BatchOutcome, DiffError, DiffOutcome, TimelineReconciler, UnsupportedDiff,
};

// Item types, re-exported so consumers need a single dependency.
pub use kiroku_types::{
    DebugIdentifier, EventId, EventItemProxy, EventTimelineItem, ItemIdentity, TimelineItem,
    TimelineItemKind, TimelineItemProxy, TransactionId, UniqueId, VirtualTimelineItem, make_proxy,
};
