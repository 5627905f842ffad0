//! Timeline configuration defaults.
//!
//! Centralizes tunables so [`TimelineConfig`](crate::TimelineConfig) defaults
//! and documentation live in one place.

/// Capacity of the element-level change broadcast.
///
/// A receiver more than this many batches behind gets `Lagged` and should
/// resync from the latest snapshot. 256 covers a full back-pagination burst.
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Log every item identifier touched by a diff (trace level).
pub const DEFAULT_LOG_ITEM_IDENTIFIERS: bool = false;

/// Yield to the runtime after each batch.
pub const DEFAULT_YIELD_BETWEEN_BATCHES: bool = true;

