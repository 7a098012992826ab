//! Progress reporting for extraction runs
//!
//! The engine reports through the `ProgressReporter` trait. In-process
//! workers forward typed events over a channel; process workers print the
//! line-tag protocol on stdout.

use std::io::Write;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::types::MissionSummary;
use crate::utils::{
    TAG_DUPLICATE_SKIPPED, TAG_RECORD_FAILED, TAG_RECORD_SAVED, TAG_RECORDS_FOUND, TAG_SUMMARY,
};

/// One progress update from a running worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Records discovered by one poll
    RecordsDiscovered(u64),
    RecordSaved,
    DuplicateSkipped,
    /// Parse or persistence failure on one record
    RecordFailed,
    /// Final counters, emitted exactly once
    Summary(MissionSummary),
}

impl ProgressEvent {
    /// Encode as one line of the tag protocol, without the newline
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::RecordsDiscovered(n) => format!("{TAG_RECORDS_FOUND} {n}"),
            Self::RecordSaved => TAG_RECORD_SAVED.to_string(),
            Self::DuplicateSkipped => TAG_DUPLICATE_SKIPPED.to_string(),
            Self::RecordFailed => TAG_RECORD_FAILED.to_string(),
            Self::Summary(summary) => match serde_json::to_string(summary) {
                Ok(json) => format!("{TAG_SUMMARY} {json}"),
                Err(_) => TAG_SUMMARY.to_string(),
            },
        }
    }
}

/// Trait for reporting extraction progress
///
/// Implementations can send updates to channels, print them, count them in
/// tests, etc. Reporting never fails the run.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);

    fn report_records_found(&self, n: u64) {
        self.report(ProgressEvent::RecordsDiscovered(n));
    }

    fn report_saved(&self) {
        self.report(ProgressEvent::RecordSaved);
    }

    fn report_duplicate(&self) {
        self.report(ProgressEvent::DuplicateSkipped);
    }

    fn report_failed(&self) {
        self.report(ProgressEvent::RecordFailed);
    }

    fn report_summary(&self, summary: MissionSummary) {
        self.report(ProgressEvent::Summary(summary));
    }
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards typed events to the supervisor
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    #[must_use]
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        // Receiver gone means the supervisor stopped listening; keep extracting.
        let _ = self.tx.send(event);
    }
}

/// Writes the line-tag protocol, one event per flushed line
pub struct LineProgress {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LineProgress {
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ProgressReporter for LineProgress {
    fn report(&self, event: ProgressEvent) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", event.to_line()).and_then(|()| out.flush()) {
            log::warn!("Failed to write progress line: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_use_protocol_tags() {
        assert_eq!(ProgressEvent::RecordSaved.to_line(), "[RECORD_SAVED]");
        assert_eq!(ProgressEvent::RecordsDiscovered(12).to_line(), "[RECORDS_FOUND] 12");
        let line = ProgressEvent::Summary(MissionSummary {
            saved: 3,
            target: 5,
            ..MissionSummary::default()
        })
        .to_line();
        assert!(line.starts_with("[MISSION_SUMMARY] {"));
        assert!(line.contains("\"saved\":3"));
    }

    #[tokio::test]
    async fn channel_progress_survives_dropped_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reporter = ChannelProgress::new(tx);
        reporter.report_saved();
        assert_eq!(rx.recv().await, Some(ProgressEvent::RecordSaved));
        drop(rx);
        reporter.report_duplicate();
    }
}
