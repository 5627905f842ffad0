//! Back-pagination status and the combined snapshot consumers observe.
//!
//! The engine reports whether it is fetching older history on a signal of its
//! own, unrelated to the diff stream. [`PaginationTracker`] folds the latest
//! value from each source into one [`TimelineSnapshot`] and suppresses
//! republishing when neither has changed.

use std::sync::Arc;

use kiroku_types::TimelineItemProxy;
use serde::{Deserialize, Serialize};

/// Whether an older-history fetch is in flight.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackPaginationStatus {
    #[default]
    Idle,
    Paginating,
}

/// Immutable view of the timeline at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineSnapshot {
    /// Ordered items, index 0 = oldest.
    pub items: Arc<[TimelineItemProxy]>,
    pub back_pagination_status: BackPaginationStatus,
}

impl TimelineSnapshot {
    pub fn new(items: Arc<[TimelineItemProxy]>, back_pagination_status: BackPaginationStatus) -> Self {
        Self { items, back_pagination_status }
    }

    pub fn empty() -> Self {
        Self::new(Arc::from(Vec::new()), BackPaginationStatus::Idle)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for TimelineSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Combines item and status updates, deduplicating against the last publish.
#[derive(Debug, Default)]
pub struct PaginationTracker {
    last: Option<TimelineSnapshot>,
}

impl PaginationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine the latest items and status.
    ///
    /// Returns `None` when both equal what was last returned. Items are
    /// compared by pointer first, then by value, so an identical sequence
    /// rebuilt by a no-op batch is still suppressed.
    pub fn combine(
        &mut self,
        items: Arc<[TimelineItemProxy]>,
        status: BackPaginationStatus,
    ) -> Option<TimelineSnapshot> {
        if let Some(last) = &self.last {
            let same_items = Arc::ptr_eq(&last.items, &items) || *last.items == *items;
            if same_items && last.back_pagination_status == status {
                return None;
            }
        }
        let snapshot = TimelineSnapshot::new(items, status);
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }

    /// The last snapshot returned by [`combine`](Self::combine).
    pub fn last(&self) -> Option<&TimelineSnapshot> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_types::{TimelineItem, make_proxy};

    fn items(ids: &[u64]) -> Arc<[TimelineItemProxy]> {
        ids.iter().map(|id| make_proxy(&TimelineItem::unknown(*id))).collect()
    }

    #[test]
    fn test_first_combine_always_publishes() {
        let mut tracker = PaginationTracker::new();
        let snapshot = tracker.combine(items(&[]), BackPaginationStatus::Idle);
        assert_eq!(snapshot, Some(TimelineSnapshot::empty()));
    }

    #[test]
    fn test_unchanged_pair_is_suppressed() {
        let mut tracker = PaginationTracker::new();
        let first = items(&[1, 2]);
        assert!(tracker.combine(first.clone(), BackPaginationStatus::Idle).is_some());
        // Same allocation.
        assert!(tracker.combine(first, BackPaginationStatus::Idle).is_none());
        // Equal values, different allocation.
        assert!(tracker.combine(items(&[1, 2]), BackPaginationStatus::Idle).is_none());
    }

    #[test]
    fn test_status_change_alone_publishes() {
        let mut tracker = PaginationTracker::new();
        let list = items(&[1]);
        tracker.combine(list.clone(), BackPaginationStatus::Idle);
        let snapshot = tracker
            .combine(list.clone(), BackPaginationStatus::Paginating)
            .expect("status changed");
        assert_eq!(snapshot.back_pagination_status, BackPaginationStatus::Paginating);
        assert!(tracker.combine(list, BackPaginationStatus::Paginating).is_none());
    }

    #[test]
    fn test_items_change_alone_publishes() {
        let mut tracker = PaginationTracker::new();
        tracker.combine(items(&[1]), BackPaginationStatus::Paginating);
        let snapshot = tracker
            .combine(items(&[1, 2]), BackPaginationStatus::Paginating)
            .expect("items changed");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(tracker.last(), Some(&snapshot));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(BackPaginationStatus::Paginating.to_string(), "paginating");
        assert_eq!(BackPaginationStatus::default(), BackPaginationStatus::Idle);
    }
}
