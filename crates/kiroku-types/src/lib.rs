//! Timeline item types for kiroku.
//!
//! This crate is the leaf of the workspace: the engine's raw item values, the
//! typed identifiers they carry, and the renderable proxies the timeline core
//! publishes. It has **no internal kiroku dependencies**.
//!
//! # Key Types
//!
//! |-----------------------|----------------------------------------------|
//! | Type                  | Purpose                                      |
//! |-----------------------|----------------------------------------------|
//! | [`TimelineItem`]      | Raw item as delivered by the sync engine     |
//! | [`UniqueId`]          | Engine handle, stable across content edits   |
//! | [`TimelineItemProxy`] | Renderable item (event, virtual, unknown)    |
//! | [`ItemIdentity`]      | Uniqueness key within the ordered sequence   |
//! | [`DebugIdentifier`]   | Compact log form of an item                  |
//! |-----------------------|----------------------------------------------|

pub mod ids;
pub mod item;
pub mod proxy;

pub use ids::{EventId, TransactionId, UniqueId};
pub use item::{EventTimelineItem, TimelineItem, TimelineItemKind, Timestamp, VirtualTimelineItem};
pub use proxy::{DebugIdentifier, EventItemProxy, ItemIdentity, TimelineItemProxy, make_proxy};
