//! Decoder for the worker line-tag protocol
//!
//! Process workers print one tag per line on stdout. Reads arrive in
//! arbitrary chunks, so bytes are buffered until a newline completes a
//! line. Anything that is not a known tag is worker logging and is dropped.

use crate::extraction::{MissionSummary, ProgressEvent};
use crate::utils::{
    TAG_DUPLICATE_SKIPPED, TAG_RECORD_FAILED, TAG_RECORD_SAVED, TAG_RECORDS_FOUND, TAG_SUMMARY,
};

/// Incremental decoder for worker stdout
#[derive(Debug, Default)]
pub struct ProgressLineDecoder {
    pending: Vec<u8>,
    summary_seen: bool,
}

impl ProgressLineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events of every line it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        events
    }

    /// Flush a final unterminated line at end of stream
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.decode_line(&line)
    }

    /// Bytes buffered without a newline yet
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn decode_line(&mut self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix(TAG_SUMMARY) {
            if self.summary_seen {
                log::debug!("Ignoring repeated mission summary");
                return None;
            }
            return match serde_json::from_str::<MissionSummary>(rest.trim()) {
                Ok(summary) => {
                    self.summary_seen = true;
                    Some(ProgressEvent::Summary(summary))
                }
                Err(e) => {
                    log::debug!("Ignoring malformed mission summary: {e}");
                    None
                }
            };
        }

        if let Some(rest) = line.strip_prefix(TAG_RECORDS_FOUND) {
            return rest.trim().parse().ok().map(ProgressEvent::RecordsDiscovered);
        }

        match line {
            TAG_RECORD_SAVED => Some(ProgressEvent::RecordSaved),
            TAG_DUPLICATE_SKIPPED => Some(ProgressEvent::DuplicateSkipped),
            TAG_RECORD_FAILED => Some(ProgressEvent::RecordFailed),
            _ => None,
        }
    }
}
