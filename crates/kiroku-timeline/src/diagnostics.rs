//! Per-conversation diagnostics for diff stream anomalies.
//!
//! Desynchronization between the engine and the local sequence is never an
//! end-user error, but operators need to see it. Each provider is handed its
//! own [`DiagnosticsSink`] at construction and reports through it; nothing
//! here is process-global.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::diff::DiffKind;
use crate::reconciler::DiffError;

/// Something a reconciler noticed that isn't a normal state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A diff was rejected and the rest of its batch skipped.
    BatchAbandoned {
        conversation_id: String,
        /// Reconciler version after the partial batch.
        version: u64,
        diff_index: usize,
        skipped: usize,
        error: DiffError,
    },
    /// A diff was accepted but not applied.
    UnsupportedOperation {
        conversation_id: String,
        kind: DiffKind,
        diff_index: usize,
    },
}

impl Diagnostic {
    pub fn conversation_id(&self) -> &str {
        match self {
            Diagnostic::BatchAbandoned { conversation_id, .. }
            | Diagnostic::UnsupportedOperation { conversation_id, .. } => conversation_id,
        }
    }
}

/// Receiver of diagnostics for one conversation.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Shared sink handle, as passed to [`crate::TimelineProvider::spawn`].
pub type SharedDiagnostics = Arc<dyn DiagnosticsSink>;

/// Logs every diagnostic through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::BatchAbandoned { conversation_id, version, diff_index, skipped, error } => {
                warn!(
                    conversation = %conversation_id,
                    version,
                    diff_index,
                    skipped,
                    "Timeline diff batch abandoned: {error}"
                );
            }
            Diagnostic::UnsupportedOperation { conversation_id, kind, diff_index } => {
                info!(
                    conversation = %conversation_id,
                    diff_index,
                    "Ignoring unsupported timeline diff: {kind}"
                );
            }
        }
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Buffers diagnostics in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    recorded: Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far, in order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.recorded.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.recorded.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.lock().is_empty()
    }

    /// Take and clear the buffer.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.recorded.lock())
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.recorded.lock().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingDiagnostics::new();
        sink.report(Diagnostic::UnsupportedOperation {
            conversation_id: "room-a".into(),
            kind: DiffKind::Truncate,
            diff_index: 0,
        });
        sink.report(Diagnostic::BatchAbandoned {
            conversation_id: "room-a".into(),
            version: 3,
            diff_index: 1,
            skipped: 0,
            error: DiffError::PopOnEmpty { kind: DiffKind::PopBack },
        });

        let recorded = sink.snapshot();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(recorded[0], Diagnostic::UnsupportedOperation { .. }));
        assert_eq!(recorded[1].conversation_id(), "room-a");

        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }
}
