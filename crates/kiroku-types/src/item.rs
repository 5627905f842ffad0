//! Raw timeline items as delivered by the sync engine.
//!
//! These are owned, immutable values. The engine hands items over inside diff
//! operations and never mutates them afterwards, so nothing here is shared
//! with the producer once it has been received.

use serde::{Deserialize, Serialize};

use crate::ids::{EventId, TransactionId, UniqueId};
use crate::proxy::DebugIdentifier;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// One entry of the engine's timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineItem {
    /// Stable engine handle, unique within the timeline.
    pub unique_id: UniqueId,
    /// What the item is.
    pub kind: TimelineItemKind,
}

/// The engine's classification of a timeline item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineItemKind {
    /// A message-like event.
    Event(EventTimelineItem),
    /// A marker that doesn't correspond to an event.
    Virtual(VirtualTimelineItem),
    /// Something this version doesn't understand.
    Unknown,
}

/// Event payload carried by an event item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTimelineItem {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    pub sender: String,
    pub body: String,
    pub timestamp: Timestamp,
}

/// A timeline item that doesn't correspond to an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VirtualTimelineItem {
    /// A divider between messages of two days.
    ///
    /// The value is a timestamp on the given day in local time.
    DayDivider(Timestamp),
    /// The user's own read marker.
    ReadMarker,
}

impl TimelineItem {
    pub fn event(unique_id: impl Into<UniqueId>, event: EventTimelineItem) -> Self {
        Self { unique_id: unique_id.into(), kind: TimelineItemKind::Event(event) }
    }

    pub fn virtual_item(unique_id: impl Into<UniqueId>, item: VirtualTimelineItem) -> Self {
        Self { unique_id: unique_id.into(), kind: TimelineItemKind::Virtual(item) }
    }

    pub fn unknown(unique_id: impl Into<UniqueId>) -> Self {
        Self { unique_id: unique_id.into(), kind: TimelineItemKind::Unknown }
    }

    /// Compact identifier for log lines.
    pub fn debug_identifier(&self) -> DebugIdentifier {
        let timeline_id = self.unique_id;
        match &self.kind {
            TimelineItemKind::Event(event) => DebugIdentifier::Event {
                timeline_id,
                event_id: event.event_id.clone(),
                transaction_id: event.transaction_id.clone(),
            },
            TimelineItemKind::Virtual(item) => DebugIdentifier::Virtual {
                timeline_id,
                description: item.description(),
            },
            TimelineItemKind::Unknown => DebugIdentifier::Unknown { timeline_id },
        }
    }
}

impl EventTimelineItem {
    /// An event with content but no ids yet.
    pub fn new(sender: impl Into<String>, body: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            event_id: None,
            transaction_id: None,
            sender: sender.into(),
            body: body.into(),
            timestamp,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<TransactionId>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

impl VirtualTimelineItem {
    /// Human-readable description used in debug identifiers.
    pub fn description(&self) -> String {
        match self {
            VirtualTimelineItem::DayDivider(timestamp) => format!("DayDivider({timestamp})"),
            VirtualTimelineItem::ReadMarker => "ReadMarker".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_identifier_for_each_kind() {
        let event = TimelineItem::event(
            1,
            EventTimelineItem::new("@amy:example.org", "hi", 10)
                .with_event_id("$e1")
                .with_transaction_id("t1"),
        );
        assert_eq!(event.debug_identifier().to_string(), "event(1, $e1, t1)");

        let divider = TimelineItem::virtual_item(2, VirtualTimelineItem::DayDivider(86_400_000));
        assert_eq!(divider.debug_identifier().to_string(), "virtual(2, DayDivider(86400000))");

        let unknown = TimelineItem::unknown(3);
        assert_eq!(unknown.debug_identifier().to_string(), "unknown(3)");
    }

    #[test]
    fn test_event_item_deserializes_without_optional_ids() {
        let text = r#"(sender: "@bob:example.org", body: "yo", timestamp: 5)"#;
        let event: EventTimelineItem = ron::from_str(text).unwrap();
        assert_eq!(event.event_id, None);
        assert_eq!(event.transaction_id, None);
        assert_eq!(event.body, "yo");
    }
}
