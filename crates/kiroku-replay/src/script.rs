//! Replay scripts and the loop that drives them through a provider.
//!
//! A script is a RON document:
//!
//! ```ron
//! (
//!     conversation_id: "!room:example.org",
//!     initial_items: [(unique_id: 1, kind: Unknown)],
//!     steps: [
//!         Diffs([PushBack(value: (unique_id: 2, kind: Unknown))]),
//!         BackPagination(paginating),
//!     ],
//! )
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use kiroku_timeline::{
    BackPaginationStatus, Diagnostic, RecordingDiagnostics, SharedSnapshot, TimelineConfig,
    TimelineDiff, TimelineItem, TimelineProvider,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A recorded session: seed items plus what the engine sent afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub conversation_id: String,
    #[serde(default)]
    pub initial_items: Vec<TimelineItem>,
    pub steps: Vec<ReplayStep>,
}

/// One engine emission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayStep {
    /// One diff batch.
    Diffs(Vec<TimelineDiff>),
    /// A back-pagination status change.
    BackPagination(BackPaginationStatus),
}

impl ReplayScript {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        ron::from_str(text).context("invalid replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_ron_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// A snapshot that became visible after a step.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Step index; `None` for the initial snapshot.
    pub step: Option<usize>,
    /// Reconciler version when the step finished.
    pub version: u64,
    pub snapshot: SharedSnapshot,
}

impl Frame {
    /// One line: step, version, status, then item identifiers oldest first.
    pub fn render(&self) -> String {
        let step = self.step.map_or_else(|| "init".to_string(), |s| s.to_string());
        let ids: Vec<String> = self
            .snapshot
            .items
            .iter()
            .map(|item| item.debug_identifier().to_string())
            .collect();
        format!(
            "[{step}] v{} {} ({}): {}",
            self.version,
            self.snapshot.back_pagination_status,
            self.snapshot.len(),
            ids.join(" ")
        )
    }
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub frames: Vec<Frame>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReplayReport {
    pub fn abandoned_batches(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::BatchAbandoned { .. }))
            .count()
    }

    pub fn unsupported_operations(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnsupportedOperation { .. }))
            .count()
    }
}

/// Feed every step through a fresh provider, flushing after each one.
///
/// A frame is recorded whenever the published snapshot changed.
pub async fn replay(script: ReplayScript, config: TimelineConfig) -> Result<ReplayReport> {
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let provider = TimelineProvider::spawn(
        script.conversation_id,
        script.initial_items,
        config,
        diagnostics.clone(),
    );
    let view = provider.view();

    let mut last = view.latest();
    let mut report = ReplayReport {
        frames: vec![Frame { step: None, version: 0, snapshot: last.clone() }],
        ..ReplayReport::default()
    };

    for (step, entry) in script.steps.into_iter().enumerate() {
        match entry {
            ReplayStep::Diffs(batch) => {
                debug!(step, diffs = batch.len(), "Replaying diff batch");
                provider.submit(batch)?;
            }
            ReplayStep::BackPagination(status) => {
                debug!(step, %status, "Replaying back-pagination status");
                provider.set_back_pagination_status(status);
            }
        }
        let version = provider.flush().await?;

        let current = view.latest();
        if !Arc::ptr_eq(&current, &last) {
            report.frames.push(Frame { step: Some(step), version, snapshot: current.clone() });
            last = current;
        }
    }

    provider.close().await;
    report.diagnostics = diagnostics.drain();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiroku_timeline::DiffKind;

    const SCRIPT: &str = r#"(
        conversation_id: "!room:example.org",
        initial_items: [
            (unique_id: 1, kind: Event((sender: "@amy:example.org", body: "hi", timestamp: 1000, event_id: Some("$e1")))),
        ],
        steps: [
            Diffs([PushBack(value: (unique_id: 2, kind: Virtual(ReadMarker)))]),
            BackPagination(paginating),
            Diffs([Truncate(length: 1)]),
            Diffs([Remove(index: 7), PushBack(value: (unique_id: 3, kind: Unknown))]),
            BackPagination(idle),
        ],
    )"#;

    #[test]
    fn test_script_parses() {
        let script = ReplayScript::from_ron_str(SCRIPT).unwrap();
        assert_eq!(script.conversation_id, "!room:example.org");
        assert_eq!(script.initial_items.len(), 1);
        assert_eq!(script.steps.len(), 5);
        assert_eq!(script.steps[1], ReplayStep::BackPagination(BackPaginationStatus::Paginating));
    }

    #[test]
    fn test_malformed_script_is_an_error() {
        assert!(ReplayScript::from_ron_str("(conversation_id: 3)").is_err());
    }

    #[tokio::test]
    async fn test_replay_records_frames_and_diagnostics() {
        let script = ReplayScript::from_ron_str(SCRIPT).unwrap();
        let report = replay(script, TimelineConfig::default()).await.unwrap();

        let lines: Vec<String> = report.frames.iter().map(Frame::render).collect();
        assert_eq!(
            lines,
            vec![
                "[init] v0 idle (1): event(1, $e1, -)",
                "[0] v1 idle (2): event(1, $e1, -) virtual(2, ReadMarker)",
                "[1] v1 paginating (2): event(1, $e1, -) virtual(2, ReadMarker)",
                "[4] v1 idle (2): event(1, $e1, -) virtual(2, ReadMarker)",
            ]
        );

        assert_eq!(report.unsupported_operations(), 1);
        assert_eq!(report.abandoned_batches(), 1);
        assert!(matches!(
            &report.diagnostics[0],
            Diagnostic::UnsupportedOperation { kind: DiffKind::Truncate, .. }
        ));
    }

    #[tokio::test]
    async fn test_bundled_demo_replays() {
        let script = ReplayScript::from_ron_str(include_str!("../../../demos/sample.ron")).unwrap();
        let report = replay(script, TimelineConfig::default()).await.unwrap();

        let last = report.frames.last().unwrap().render();
        assert_eq!(
            last,
            "[4] v3 idle (6): event(5, $z9, -) unknown(6) virtual(1, DayDivider(1700006400000)) \
             event(2, $a1, -) event(3, $a2, t-17) virtual(4, ReadMarker)"
        );
        assert_eq!(report.abandoned_batches(), 1);
        assert_eq!(report.unsupported_operations(), 1);
    }
}
