//! Renderable proxies over raw engine items.
//!
//! [`make_proxy`] is total: every [`TimelineItem`] maps to exactly one
//! [`TimelineItemProxy`] variant, including item kinds this version doesn't
//! understand. Unknown items keep their identity so that their neighbours'
//! positions stay correct when later diffs index past them.
//!
//! Identity is taken from the engine's [`UniqueId`] and nothing else, so an
//! edit that rewrites an event's body keeps the same identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{EventId, TransactionId, UniqueId};
use crate::item::{TimelineItem, TimelineItemKind, Timestamp, VirtualTimelineItem};

/// Identity of a proxy within the ordered sequence.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(UniqueId);

impl ItemIdentity {
    pub const fn new(unique_id: UniqueId) -> Self {
        Self(unique_id)
    }

    pub const fn unique_id(&self) -> UniqueId {
        self.0
    }
}

impl From<UniqueId> for ItemIdentity {
    fn from(id: UniqueId) -> Self {
        Self(id)
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemIdentity({})", self.0)
    }
}

/// An event as the rendering layer sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventItemProxy {
    pub identity: ItemIdentity,
    pub event_id: Option<EventId>,
    pub transaction_id: Option<TransactionId>,
    pub sender: String,
    pub body: String,
    pub timestamp: Timestamp,
}

/// A renderable timeline entry.
///
/// Closed set: consumers match exhaustively, so adding a variant is a
/// compile error at every site that renders items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineItemProxy {
    Event(EventItemProxy),
    Virtual {
        identity: ItemIdentity,
        kind: VirtualTimelineItem,
    },
    Unknown {
        identity: ItemIdentity,
    },
}

/// Wrap a raw engine item. Pure and infallible.
pub fn make_proxy(item: &TimelineItem) -> TimelineItemProxy {
    let identity = ItemIdentity::new(item.unique_id);
    match &item.kind {
        TimelineItemKind::Event(event) => TimelineItemProxy::Event(EventItemProxy {
            identity,
            event_id: event.event_id.clone(),
            transaction_id: event.transaction_id.clone(),
            sender: event.sender.clone(),
            body: event.body.clone(),
            timestamp: event.timestamp,
        }),
        TimelineItemKind::Virtual(kind) => TimelineItemProxy::Virtual { identity, kind: *kind },
        TimelineItemKind::Unknown => TimelineItemProxy::Unknown { identity },
    }
}

impl From<&TimelineItem> for TimelineItemProxy {
    fn from(item: &TimelineItem) -> Self {
        make_proxy(item)
    }
}

impl From<TimelineItem> for TimelineItemProxy {
    fn from(item: TimelineItem) -> Self {
        let identity = ItemIdentity::new(item.unique_id);
        match item.kind {
            TimelineItemKind::Event(event) => TimelineItemProxy::Event(EventItemProxy {
                identity,
                event_id: event.event_id,
                transaction_id: event.transaction_id,
                sender: event.sender,
                body: event.body,
                timestamp: event.timestamp,
            }),
            TimelineItemKind::Virtual(kind) => TimelineItemProxy::Virtual { identity, kind },
            TimelineItemKind::Unknown => TimelineItemProxy::Unknown { identity },
        }
    }
}

impl TimelineItemProxy {
    pub fn identity(&self) -> ItemIdentity {
        match self {
            TimelineItemProxy::Event(event) => event.identity,
            TimelineItemProxy::Virtual { identity, .. } => *identity,
            TimelineItemProxy::Unknown { identity } => *identity,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, TimelineItemProxy::Event(_))
    }

    pub fn event_id(&self) -> Option<&EventId> {
        match self {
            TimelineItemProxy::Event(event) => event.event_id.as_ref(),
            TimelineItemProxy::Virtual { .. } | TimelineItemProxy::Unknown { .. } => None,
        }
    }

    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            TimelineItemProxy::Event(event) => event.transaction_id.as_ref(),
            TimelineItemProxy::Virtual { .. } | TimelineItemProxy::Unknown { .. } => None,
        }
    }

    /// Compact identifier for log lines.
    pub fn debug_identifier(&self) -> DebugIdentifier {
        match self {
            TimelineItemProxy::Event(event) => DebugIdentifier::Event {
                timeline_id: event.identity.unique_id(),
                event_id: event.event_id.clone(),
                transaction_id: event.transaction_id.clone(),
            },
            TimelineItemProxy::Virtual { identity, kind } => DebugIdentifier::Virtual {
                timeline_id: identity.unique_id(),
                description: kind.description(),
            },
            TimelineItemProxy::Unknown { identity } => DebugIdentifier::Unknown {
                timeline_id: identity.unique_id(),
            },
        }
    }
}

/// What gets printed for an item in verbose diff logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DebugIdentifier {
    Event {
        timeline_id: UniqueId,
        event_id: Option<EventId>,
        transaction_id: Option<TransactionId>,
    },
    Virtual {
        timeline_id: UniqueId,
        description: String,
    },
    Unknown {
        timeline_id: UniqueId,
    },
}

impl fmt::Display for DebugIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugIdentifier::Event { timeline_id, event_id, transaction_id } => {
                let event_id = event_id.as_ref().map_or("-", EventId::as_str);
                let transaction_id = transaction_id.as_ref().map_or("-", TransactionId::as_str);
                write!(f, "event({timeline_id}, {event_id}, {transaction_id})")
            }
            DebugIdentifier::Virtual { timeline_id, description } => {
                write!(f, "virtual({timeline_id}, {description})")
            }
            DebugIdentifier::Unknown { timeline_id } => write!(f, "unknown({timeline_id})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::EventTimelineItem;

    fn message(id: u64, body: &str) -> TimelineItem {
        TimelineItem::event(
            id,
            EventTimelineItem::new("@amy:example.org", body, 1_000 + id)
                .with_event_id(format!("$e{id}")),
        )
    }

    #[test]
    fn test_make_proxy_event() {
        let proxy = make_proxy(&message(7, "hello"));
        assert!(proxy.is_event());
        assert_eq!(proxy.identity(), ItemIdentity::new(UniqueId::new(7)));
        assert_eq!(proxy.event_id().map(EventId::as_str), Some("$e7"));
        assert_eq!(proxy.transaction_id(), None);
    }

    #[test]
    fn test_make_proxy_virtual_and_unknown() {
        let marker = make_proxy(&TimelineItem::virtual_item(3, VirtualTimelineItem::ReadMarker));
        assert!(matches!(
            marker,
            TimelineItemProxy::Virtual { kind: VirtualTimelineItem::ReadMarker, .. }
        ));
        assert_eq!(marker.identity().unique_id().get(), 3);

        let unknown = make_proxy(&TimelineItem::unknown(9));
        assert_eq!(unknown, TimelineItemProxy::Unknown { identity: UniqueId::new(9).into() });
        assert_eq!(unknown.event_id(), None);
    }

    #[test]
    fn test_make_proxy_is_deterministic() {
        let item = message(4, "same");
        assert_eq!(make_proxy(&item), make_proxy(&item));
        assert_eq!(make_proxy(&item), TimelineItemProxy::from(item.clone()));
    }

    #[test]
    fn test_identity_survives_content_edit() {
        let original = make_proxy(&message(5, "typo"));
        let edited = make_proxy(&message(5, "fixed"));
        assert_ne!(original, edited);
        assert_eq!(original.identity(), edited.identity());
    }

    #[test]
    fn test_proxy_debug_identifier_matches_raw() {
        let item = TimelineItem::event(
            11,
            EventTimelineItem::new("@bob:example.org", "sending", 0).with_transaction_id("txn"),
        );
        assert_eq!(make_proxy(&item).debug_identifier(), item.debug_identifier());
        assert_eq!(item.debug_identifier().to_string(), "event(11, -, txn)");
    }
}
