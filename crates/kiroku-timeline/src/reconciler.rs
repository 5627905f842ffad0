//! Diff reconciliation for a single conversation timeline.
//!
//! [`TimelineReconciler`] folds engine diffs into an ordered sequence of
//! [`TimelineItemProxy`] values. It is a plain synchronous state machine with
//! no knowledge of channels or tasks, so every rule below is unit-testable on
//! its own; the serialized worker in [`crate::provider`] owns one instance.
//!
//! # Batch Protocol
//!
//! - Diffs in a batch are applied one at a time, in order.
//! - Every diff is validated before it mutates anything, so a rejected diff
//!   leaves the sequence exactly as the previous diff left it.
//! - The first rejected diff abandons the rest of its batch. Diffs already
//!   applied from that batch stay applied.
//! - `Truncate` is accepted and ignored.
//!
//! ```text
//! +----------------+  Ok(Applied)   +----------------+
//! |  diff i        | -------------> |  diff i + 1    |
//! +-------+--------+                +----------------+
//!         | Err(DiffError)
//!         v
//! +----------------+
//! |   Abandoned    | remaining diffs skipped, state = after diff i - 1
//! +----------------+
//! ```

use std::collections::HashSet;

use kiroku_types::{ItemIdentity, TimelineItem, TimelineItemProxy};
use thiserror::Error;
use tracing::{trace, warn};

use crate::diff::{DiffKind, TimelineChange, TimelineDiff};

/// Why a diff could not be applied. Every variant means the engine's view and
/// ours have diverged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("{kind}: index {index} out of bounds for length {len}")]
    IndexOutOfBounds { kind: DiffKind, index: usize, len: usize },
    #[error("{kind} on empty timeline")]
    PopOnEmpty { kind: DiffKind },
    #[error("{kind}: identity {identity} already present")]
    DuplicateIdentity { kind: DiffKind, identity: ItemIdentity },
}

/// Result of applying one diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The sequence changed as described.
    Applied(Vec<TimelineChange>),
    /// Accepted but deliberately not applied (see [`DiffKind::Truncate`]).
    Ignored,
}

/// The diff that stopped a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedDiff {
    /// Position of the rejected diff within its batch.
    pub diff_index: usize,
    /// Diffs after it that were never looked at.
    pub skipped: usize,
    pub error: DiffError,
}

/// A diff that was accepted without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedDiff {
    pub diff_index: usize,
    pub kind: DiffKind,
}

/// Result of applying a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of diffs that changed the sequence.
    pub applied: usize,
    /// Element-level changes, in application order.
    pub changes: Vec<TimelineChange>,
    pub abandoned: Option<AbandonedDiff>,
    pub unsupported: Vec<UnsupportedDiff>,
    /// Reconciler version after the batch.
    pub version: u64,
}

impl BatchOutcome {
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }
}

/// Owns the ordered sequence for one conversation.
#[derive(Debug, Clone, Default)]
pub struct TimelineReconciler {
    items: Vec<TimelineItemProxy>,
    /// Mirrors the identities in `items`; kept in lockstep.
    identities: HashSet<ItemIdentity>,
    /// Bumped once per batch that applied at least one diff.
    version: u64,
    /// Log item identifiers for every diff at trace level.
    verbose: bool,
}

impl TimelineReconciler {
    /// Create a reconciler seeded with the engine's current items.
    ///
    /// A seed item whose identity repeats an earlier one is dropped.
    pub fn new(initial: impl IntoIterator<Item = TimelineItem>) -> Self {
        let mut reconciler = Self::default();
        for item in initial {
            let proxy = TimelineItemProxy::from(item);
            if reconciler.identities.insert(proxy.identity()) {
                reconciler.items.push(proxy);
            } else {
                warn!("Dropping seed item with duplicate identity {}", proxy.identity());
            }
        }
        reconciler
    }

    /// Enable per-diff identifier logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn items(&self) -> &[TimelineItemProxy] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, identity: ItemIdentity) -> bool {
        self.identities.contains(&identity)
    }

    /// Apply a batch, stopping at the first rejected diff.
    pub fn apply_batch(&mut self, batch: impl IntoIterator<Item = TimelineDiff>) -> BatchOutcome {
        let batch: Vec<TimelineDiff> = batch.into_iter().collect();
        let total = batch.len();
        let mut outcome = BatchOutcome::default();

        for (diff_index, diff) in batch.into_iter().enumerate() {
            let kind = diff.kind();
            match self.apply_diff(diff) {
                Ok(DiffOutcome::Applied(changes)) => {
                    outcome.applied += 1;
                    outcome.changes.extend(changes);
                }
                Ok(DiffOutcome::Ignored) => {
                    outcome.unsupported.push(UnsupportedDiff { diff_index, kind });
                }
                Err(error) => {
                    let skipped = total - diff_index - 1;
                    warn!(
                        "Abandoning batch at diff {}/{}: {} ({} skipped)",
                        diff_index + 1,
                        total,
                        error,
                        skipped
                    );
                    outcome.abandoned = Some(AbandonedDiff { diff_index, skipped, error });
                    break;
                }
            }
        }

        if outcome.applied > 0 {
            self.version = self.version.wrapping_add(1);
        }
        outcome.version = self.version;
        outcome
    }

    /// Apply a single diff against the current sequence.
    pub fn apply_diff(&mut self, diff: TimelineDiff) -> Result<DiffOutcome, DiffError> {
        let kind = diff.kind();
        let changes = match diff {
            TimelineDiff::Append { values } => {
                let proxies = self.admit(kind, values)?;
                let base = self.items.len();
                self.trace_items(kind, &proxies);
                proxies
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.insert_at(base + i, item))
                    .collect()
            }
            TimelineDiff::Clear => {
                trace!("Clear all {} items", self.items.len());
                self.identities.clear();
                self.items
                    .drain(..)
                    .enumerate()
                    .map(|(offset, item)| TimelineChange::Remove { offset, item })
                    .collect()
            }
            TimelineDiff::Insert { index, value } => {
                self.check_index(kind, index, self.items.len() + 1)?;
                let proxy = self.admit_one(kind, value)?;
                self.trace_items(kind, std::slice::from_ref(&proxy));
                vec![self.insert_at(index, proxy)]
            }
            TimelineDiff::PopBack => {
                if self.items.is_empty() {
                    return Err(DiffError::PopOnEmpty { kind });
                }
                vec![self.remove_at(self.items.len() - 1)]
            }
            TimelineDiff::PopFront => {
                if self.items.is_empty() {
                    return Err(DiffError::PopOnEmpty { kind });
                }
                vec![self.remove_at(0)]
            }
            TimelineDiff::PushBack { value } => {
                let proxy = self.admit_one(kind, value)?;
                self.trace_items(kind, std::slice::from_ref(&proxy));
                vec![self.insert_at(self.items.len(), proxy)]
            }
            TimelineDiff::PushFront { value } => {
                let proxy = self.admit_one(kind, value)?;
                self.trace_items(kind, std::slice::from_ref(&proxy));
                vec![self.insert_at(0, proxy)]
            }
            TimelineDiff::Remove { index } => {
                self.check_index(kind, index, self.items.len())?;
                vec![self.remove_at(index)]
            }
            TimelineDiff::Reset { values } => {
                // Only the new set has to be internally unique; the old items
                // are all going away.
                let proxies = unique_proxies(kind, values, &HashSet::new())?;
                self.trace_items(kind, &proxies);
                let mut changes: Vec<TimelineChange> = self
                    .items
                    .drain(..)
                    .enumerate()
                    .map(|(offset, item)| TimelineChange::Remove { offset, item })
                    .collect();
                self.identities = proxies.iter().map(TimelineItemProxy::identity).collect();
                changes.extend(
                    proxies
                        .iter()
                        .enumerate()
                        .map(|(offset, item)| TimelineChange::Insert { offset, item: item.clone() }),
                );
                self.items = proxies;
                changes
            }
            TimelineDiff::Set { index, value } => {
                self.check_index(kind, index, self.items.len())?;
                let proxy = TimelineItemProxy::from(value);
                let identity = proxy.identity();
                let previous = self.items[index].identity();
                if identity != previous && self.identities.contains(&identity) {
                    return Err(DiffError::DuplicateIdentity { kind, identity });
                }
                self.trace_items(kind, std::slice::from_ref(&proxy));
                self.identities.remove(&previous);
                self.identities.insert(identity);
                let old = std::mem::replace(&mut self.items[index], proxy.clone());
                vec![
                    TimelineChange::Remove { offset: index, item: old },
                    TimelineChange::Insert { offset: index, item: proxy },
                ]
            }
            TimelineDiff::Truncate { length } => {
                trace!("Ignoring truncate to {} (have {})", length, self.items.len());
                return Ok(DiffOutcome::Ignored);
            }
        };
        Ok(DiffOutcome::Applied(changes))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_index(&self, kind: DiffKind, index: usize, bound: usize) -> Result<(), DiffError> {
        if index < bound {
            Ok(())
        } else {
            Err(DiffError::IndexOutOfBounds { kind, index, len: self.items.len() })
        }
    }

    fn admit_one(&self, kind: DiffKind, value: TimelineItem) -> Result<TimelineItemProxy, DiffError> {
        let proxy = TimelineItemProxy::from(value);
        if self.identities.contains(&proxy.identity()) {
            return Err(DiffError::DuplicateIdentity { kind, identity: proxy.identity() });
        }
        Ok(proxy)
    }

    fn admit(
        &self,
        kind: DiffKind,
        values: Vec<TimelineItem>,
    ) -> Result<Vec<TimelineItemProxy>, DiffError> {
        unique_proxies(kind, values, &self.identities)
    }

    fn insert_at(&mut self, offset: usize, item: TimelineItemProxy) -> TimelineChange {
        self.identities.insert(item.identity());
        self.items.insert(offset, item.clone());
        TimelineChange::Insert { offset, item }
    }

    fn remove_at(&mut self, offset: usize) -> TimelineChange {
        let item = self.items.remove(offset);
        self.identities.remove(&item.identity());
        if self.verbose {
            trace!("Remove {} at {}", item.debug_identifier(), offset);
        }
        TimelineChange::Remove { offset, item }
    }

    fn trace_items(&self, kind: DiffKind, items: &[TimelineItemProxy]) {
        if !self.verbose {
            return;
        }
        let ids: Vec<String> = items.iter().map(|i| i.debug_identifier().to_string()).collect();
        trace!("{} [{}]", kind, ids.join(", "));
    }
}

/// Convert items to proxies, rejecting identities already in `existing` or
/// repeated within `values`.
fn unique_proxies(
    kind: DiffKind,
    values: Vec<TimelineItem>,
    existing: &HashSet<ItemIdentity>,
) -> Result<Vec<TimelineItemProxy>, DiffError> {
    let mut seen = HashSet::with_capacity(values.len());
    values
        .into_iter()
        .map(|value| {
            let proxy = TimelineItemProxy::from(value);
            let identity = proxy.identity();
            if existing.contains(&identity) || !seen.insert(identity) {
                Err(DiffError::DuplicateIdentity { kind, identity })
            } else {
                Ok(proxy)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{EventTimelineItem, UniqueId, VirtualTimelineItem};

    /// Helper: an event item with a body that defaults to its id.
    fn event(id: u64) -> TimelineItem {
        event_with_body(id, &format!("message {id}"))
    }

    fn event_with_body(id: u64, body: &str) -> TimelineItem {
        TimelineItem::event(
            id,
            EventTimelineItem::new("@amy:example.org", body, id * 1_000)
                .with_event_id(format!("$e{id}")),
        )
    }

    fn ids(reconciler: &TimelineReconciler) -> Vec<u64> {
        reconciler.items().iter().map(|i| i.identity().unique_id().get()).collect()
    }

    fn identity(id: u64) -> ItemIdentity {
        ItemIdentity::new(UniqueId::new(id))
    }

    // =========================================================================
    // Single diffs
    // =========================================================================

    #[test]
    fn test_append_then_push_front() {
        let mut r = TimelineReconciler::new([]);
        r.apply_batch([TimelineDiff::append([event(1), event(2)])]);
        assert_eq!(ids(&r), vec![1, 2]);

        r.apply_batch([TimelineDiff::push_front(event(0))]);
        assert_eq!(ids(&r), vec![0, 1, 2]);
        assert_eq!(r.version(), 2);
    }

    #[test]
    fn test_set_with_same_identity_keeps_position() {
        let mut r = TimelineReconciler::new([event(0), event(1), event(2)]);
        let outcome = r.apply_batch([TimelineDiff::set(1, event_with_body(1, "edited"))]);

        assert_eq!(ids(&r), vec![0, 1, 2]);
        match &r.items()[1] {
            TimelineItemProxy::Event(e) => assert_eq!(e.body, "edited"),
            other => panic!("expected event, got {other:?}"),
        }
        assert_eq!(outcome.changes.len(), 2);
        assert!(matches!(outcome.changes[0], TimelineChange::Remove { offset: 1, .. }));
        assert!(matches!(outcome.changes[1], TimelineChange::Insert { offset: 1, .. }));
        assert_eq!(outcome.changes[0].item().identity(), outcome.changes[1].item().identity());
    }

    #[test]
    fn test_set_with_new_identity_swaps_item() {
        let mut r = TimelineReconciler::new([event(0), event(1)]);
        r.apply_batch([TimelineDiff::set(0, event(9))]);
        assert_eq!(ids(&r), vec![9, 1]);
        assert!(r.contains(identity(9)));
        assert!(!r.contains(identity(0)));
    }

    #[test]
    fn test_set_to_identity_held_elsewhere_is_rejected() {
        let mut r = TimelineReconciler::new([event(0), event(1)]);
        let err = r.apply_diff(TimelineDiff::set(0, event(1))).unwrap_err();
        assert_eq!(err, DiffError::DuplicateIdentity { kind: DiffKind::Set, identity: identity(1) });
        assert_eq!(ids(&r), vec![0, 1]);
    }

    #[test]
    fn test_insert_bounds() {
        let mut r = TimelineReconciler::new([event(0)]);
        // Inserting at len is allowed.
        r.apply_diff(TimelineDiff::insert(1, event(1))).unwrap();
        assert_eq!(ids(&r), vec![0, 1]);

        let err = r.apply_diff(TimelineDiff::insert(3, event(2))).unwrap_err();
        assert_eq!(err, DiffError::IndexOutOfBounds { kind: DiffKind::Insert, index: 3, len: 2 });
    }

    #[test]
    fn test_remove_bounds() {
        let mut r = TimelineReconciler::new([event(0), event(1)]);
        let err = r.apply_diff(TimelineDiff::remove(2)).unwrap_err();
        assert!(matches!(err, DiffError::IndexOutOfBounds { index: 2, len: 2, .. }));

        r.apply_diff(TimelineDiff::remove(0)).unwrap();
        assert_eq!(ids(&r), vec![1]);
        assert!(!r.contains(identity(0)));
    }

    #[test]
    fn test_pop_on_empty_is_an_error() {
        let mut r = TimelineReconciler::new([]);
        assert_eq!(
            r.apply_diff(TimelineDiff::PopBack).unwrap_err(),
            DiffError::PopOnEmpty { kind: DiffKind::PopBack }
        );
        assert_eq!(
            r.apply_diff(TimelineDiff::PopFront).unwrap_err(),
            DiffError::PopOnEmpty { kind: DiffKind::PopFront }
        );
    }

    #[test]
    fn test_pop_front_and_back() {
        let mut r = TimelineReconciler::new([event(0), event(1), event(2)]);
        r.apply_batch([TimelineDiff::PopFront, TimelineDiff::PopBack]);
        assert_eq!(ids(&r), vec![1]);
    }

    #[test]
    fn test_clear_records_one_removal_per_item_oldest_first() {
        let mut r = TimelineReconciler::new([event(0), event(1), event(2)]);
        let outcome = r.apply_batch([TimelineDiff::Clear]);
        assert!(r.is_empty());
        let offsets: Vec<usize> = outcome.changes.iter().map(TimelineChange::offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert!(outcome.changes.iter().all(|c| matches!(c, TimelineChange::Remove { .. })));
        assert!(!r.contains(identity(1)));
    }

    #[test]
    fn test_reset_replaces_everything() {
        let mut r = TimelineReconciler::new([event(0), event(1)]);
        let outcome = r.apply_batch([TimelineDiff::reset([event(1), event(5)])]);
        assert_eq!(ids(&r), vec![1, 5]);
        // Two removals then two insertions.
        assert_eq!(outcome.changes.len(), 4);
        assert!(!r.contains(identity(0)));
        assert!(r.contains(identity(5)));
    }

    #[test]
    fn test_reset_twice_is_idempotent() {
        let mut once = TimelineReconciler::new([event(0)]);
        once.apply_batch([TimelineDiff::reset([event(3), event(4)])]);

        let mut twice = TimelineReconciler::new([event(0)]);
        twice.apply_batch([TimelineDiff::reset([event(3), event(4)])]);
        twice.apply_batch([TimelineDiff::reset([event(3), event(4)])]);

        assert_eq!(once.items(), twice.items());
    }

    #[test]
    fn test_reset_rejects_internal_duplicates() {
        let mut r = TimelineReconciler::new([event(0)]);
        let err = r.apply_diff(TimelineDiff::reset([event(1), event(1)])).unwrap_err();
        assert!(matches!(err, DiffError::DuplicateIdentity { kind: DiffKind::Reset, .. }));
        assert_eq!(ids(&r), vec![0]);
    }

    #[test]
    fn test_append_with_duplicate_leaves_state_untouched() {
        let mut r = TimelineReconciler::new([event(0)]);
        let err = r.apply_diff(TimelineDiff::append([event(1), event(0)])).unwrap_err();
        assert!(matches!(err, DiffError::DuplicateIdentity { kind: DiffKind::Append, .. }));
        assert_eq!(ids(&r), vec![0]);
        assert!(!r.contains(identity(1)));
    }

    #[test]
    fn test_push_back_duplicate_is_rejected() {
        let mut r = TimelineReconciler::new([event(0)]);
        assert!(r.apply_diff(TimelineDiff::push_back(event(0))).is_err());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_truncate_is_ignored() {
        let mut r = TimelineReconciler::new([event(0), event(1)]);
        let outcome = r.apply_batch([TimelineDiff::Truncate { length: 1 }]);
        assert_eq!(ids(&r), vec![0, 1]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.unsupported, vec![UnsupportedDiff { diff_index: 0, kind: DiffKind::Truncate }]);
        // Nothing changed, so no version bump.
        assert_eq!(r.version(), 0);
    }

    #[test]
    fn test_unknown_and_virtual_items_round_trip() {
        let mut r = TimelineReconciler::new([]);
        r.apply_batch([
            TimelineDiff::push_back(TimelineItem::virtual_item(10, VirtualTimelineItem::DayDivider(0))),
            TimelineDiff::push_back(TimelineItem::unknown(11)),
            TimelineDiff::push_back(event(12)),
            TimelineDiff::insert(2, TimelineItem::virtual_item(13, VirtualTimelineItem::ReadMarker)),
        ]);
        assert_eq!(ids(&r), vec![10, 11, 13, 12]);
        assert_eq!(r.items()[1], TimelineItemProxy::Unknown { identity: identity(11) });

        // Indexing past the unknown item still lands in the right place.
        r.apply_batch([TimelineDiff::remove(2)]);
        assert_eq!(ids(&r), vec![10, 11, 12]);
    }

    // =========================================================================
    // Batches
    // =========================================================================

    #[test]
    fn test_batch_abandoned_at_out_of_range_remove() {
        let mut r = TimelineReconciler::new([event(0)]);
        let outcome = r.apply_batch([
            TimelineDiff::push_back(event(1)),
            TimelineDiff::remove(5),
            TimelineDiff::push_back(event(2)),
        ]);

        assert_eq!(ids(&r), vec![0, 1]);
        assert_eq!(outcome.applied, 1);
        let abandoned = outcome.abandoned.expect("batch should be abandoned");
        assert_eq!(abandoned.diff_index, 1);
        assert_eq!(abandoned.skipped, 1);
        assert_eq!(abandoned.error, DiffError::IndexOutOfBounds { kind: DiffKind::Remove, index: 5, len: 2 });
        // The first diff did apply.
        assert_eq!(outcome.version, 1);
    }

    #[test]
    fn test_batch_abandoned_on_first_diff_does_not_bump_version() {
        let mut r = TimelineReconciler::new([]);
        let outcome = r.apply_batch([TimelineDiff::PopFront, TimelineDiff::push_back(event(1))]);
        assert!(outcome.is_abandoned());
        assert!(r.is_empty());
        assert_eq!(r.version(), 0);
    }

    #[test]
    fn test_diffs_within_batch_see_previous_diffs() {
        let mut r = TimelineReconciler::new([]);
        r.apply_batch([
            TimelineDiff::push_back(event(1)),
            // Index 1 is only valid because the push above already happened.
            TimelineDiff::insert(1, event(2)),
            TimelineDiff::set(0, event_with_body(1, "edited")),
            TimelineDiff::remove(1),
        ]);
        assert_eq!(ids(&r), vec![1]);
    }

    #[test]
    fn test_seed_drops_duplicate_identities() {
        let r = TimelineReconciler::new([event(1), event(2), event(1)]);
        assert_eq!(ids(&r), vec![1, 2]);
    }
}
