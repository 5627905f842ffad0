//! Diff operations from the sync engine and the element-level changes they
//! produce.
//!
//! The engine describes every change to its timeline as a [`TimelineDiff`].
//! Diffs arrive in batches; each diff in a batch is relative to the sequence
//! as left by the diff before it, never to the state at the start of the batch.

use std::sync::Arc;

use kiroku_types::{TimelineItem, TimelineItemProxy};
use serde::{Deserialize, Serialize};

/// One edit to the engine's timeline, carrying owned item values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineDiff {
    /// Add items at the end, in order.
    Append { values: Vec<TimelineItem> },
    /// Remove everything.
    Clear,
    /// Insert one item at `index` (`0..=len`).
    Insert { index: usize, value: TimelineItem },
    PopBack,
    PopFront,
    PushBack { value: TimelineItem },
    PushFront { value: TimelineItem },
    /// Remove the item at `index` (`0..len`).
    Remove { index: usize },
    /// Replace the whole sequence (after a resync).
    Reset { values: Vec<TimelineItem> },
    /// Replace the item at `index` (`0..len`).
    Set { index: usize, value: TimelineItem },
    /// Engine-side eviction of distant history. Not applied locally.
    Truncate { length: usize },
}

/// Fieldless discriminant of [`TimelineDiff`], for logs and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiffKind {
    Append,
    Clear,
    Insert,
    PopBack,
    PopFront,
    PushBack,
    PushFront,
    Remove,
    Reset,
    Set,
    Truncate,
}

impl TimelineDiff {
    pub fn kind(&self) -> DiffKind {
        match self {
            TimelineDiff::Append { .. } => DiffKind::Append,
            TimelineDiff::Clear => DiffKind::Clear,
            TimelineDiff::Insert { .. } => DiffKind::Insert,
            TimelineDiff::PopBack => DiffKind::PopBack,
            TimelineDiff::PopFront => DiffKind::PopFront,
            TimelineDiff::PushBack { .. } => DiffKind::PushBack,
            TimelineDiff::PushFront { .. } => DiffKind::PushFront,
            TimelineDiff::Remove { .. } => DiffKind::Remove,
            TimelineDiff::Reset { .. } => DiffKind::Reset,
            TimelineDiff::Set { .. } => DiffKind::Set,
            TimelineDiff::Truncate { .. } => DiffKind::Truncate,
        }
    }

    pub fn append(values: impl IntoIterator<Item = TimelineItem>) -> Self {
        TimelineDiff::Append { values: values.into_iter().collect() }
    }

    pub fn reset(values: impl IntoIterator<Item = TimelineItem>) -> Self {
        TimelineDiff::Reset { values: values.into_iter().collect() }
    }

    pub fn insert(index: usize, value: TimelineItem) -> Self {
        TimelineDiff::Insert { index, value }
    }

    pub fn set(index: usize, value: TimelineItem) -> Self {
        TimelineDiff::Set { index, value }
    }

    pub fn push_back(value: TimelineItem) -> Self {
        TimelineDiff::PushBack { value }
    }

    pub fn push_front(value: TimelineItem) -> Self {
        TimelineDiff::PushFront { value }
    }

    pub fn remove(index: usize) -> Self {
        TimelineDiff::Remove { index }
    }
}

/// Element-level record of one applied diff.
///
/// Offsets are in the frame of the diff that produced them: removals emitted
/// by `Clear` and `Reset` carry their pre-diff offsets, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimelineChange {
    Insert { offset: usize, item: TimelineItemProxy },
    Remove { offset: usize, item: TimelineItemProxy },
}

impl TimelineChange {
    pub fn offset(&self) -> usize {
        match self {
            TimelineChange::Insert { offset, .. } | TimelineChange::Remove { offset, .. } => *offset,
        }
    }

    pub fn item(&self) -> &TimelineItemProxy {
        match self {
            TimelineChange::Insert { item, .. } | TimelineChange::Remove { item, .. } => item,
        }
    }
}

/// All element-level changes from one completed batch.
///
/// Broadcast to consumers that animate individual rows. Not part of the
/// snapshot contract: a receiver that lags must resync from the latest
/// snapshot instead of replaying changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineChangeSet {
    /// Reconciler version after the batch.
    pub version: u64,
    pub changes: Vec<TimelineChange>,
}

pub type SharedChangeSet = Arc<TimelineChangeSet>;
