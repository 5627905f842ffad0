//! Typed identifiers for timeline items and the events behind them.
//!
//! [`UniqueId`] is the sync engine's per-item handle. It is stable for as long
//! as the engine keeps the item in its window, including across content edits,
//! and is what identity checks are keyed on.
//!
//! [`EventId`] and [`TransactionId`] are server- and client-assigned event
//! names. Either may be missing: a local echo has a transaction id but no event
//! id yet, and an event sent from another device has an event id only.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The engine's stable identifier for one timeline item.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(u64);

impl UniqueId {
    /// Wrap a raw engine id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for UniqueId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.0)
    }
}

/// A server-assigned event identifier (e.g. `$abc:example.org`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

/// A client-assigned transaction identifier for a locally sent event.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap an identifier string as received from the engine.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_string_id!(EventId, "EventId");
impl_string_id!(TransactionId, "TransactionId");
