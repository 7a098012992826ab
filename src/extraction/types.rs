//! Core types produced and consumed by the extraction engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use super::query::FilterSet;

/// One record read from the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub advertiser: String,
    pub description: String,
    pub contact: Option<String>,
    pub location: Option<String>,
    /// Page URL the record was read from
    pub source: String,
    pub keyword: String,
    pub captured_at: DateTime<Utc>,
}

impl ExtractedRecord {
    /// Session-local dedup fingerprint over (advertiser, description)
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.advertiser, &self.description)
    }
}

/// xxh3 over the dedup key fields, NUL-separated
#[must_use]
pub fn fingerprint(advertiser: &str, description: &str) -> u64 {
    let mut key = String::with_capacity(advertiser.len() + description.len() + 1);
    key.push_str(advertiser);
    key.push('\0');
    key.push_str(description);
    xxh3_64(key.as_bytes())
}

/// Why a run ended. Every variant is a normal, completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    AttemptBudgetExhausted,
    Stalled,
    TimeLimit,
    QuotaReached,
}

/// Final counters of a run, emitted exactly once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub found: u64,
    pub saved: u64,
    pub duplicates: u64,
    pub processed: u64,
    #[serde(default)]
    pub target: u64,
    #[serde(default)]
    pub achieved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// Everything a worker needs to run one mission, serialized as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInvocation {
    pub mission_id: String,
    pub owner_id: String,
    pub keyword: String,
    pub max_records: u64,
    pub daily_quota: u64,
    #[serde(default)]
    pub filters: FilterSet,
    /// Raises the date-range start when resuming
    #[serde(default)]
    pub resume_cutoff: Option<NaiveDate>,
}

impl WorkerInvocation {
    /// Filters with the resume cutoff applied
    #[must_use]
    pub fn effective_filters(&self) -> FilterSet {
        self.filters.clone().with_resume_cutoff(self.resume_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_separates_fields() {
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
        assert_eq!(fingerprint("a", "b"), fingerprint("a", "b"));
    }

    #[test]
    fn invocation_accepts_minimal_json() {
        let inv: WorkerInvocation = serde_json::from_str(
            r#"{"mission_id":"m1","owner_id":"u1","keyword":"shoes","max_records":50,"daily_quota":200}"#,
        )
        .unwrap();
        assert_eq!(inv.filters, FilterSet::default());
        assert!(inv.resume_cutoff.is_none());
    }

    #[test]
    fn summary_without_stop_reason_parses() {
        let s: MissionSummary = serde_json::from_str(
            r#"{"found":10,"saved":4,"duplicates":2,"processed":7,"target":5,"achieved":false}"#,
        )
        .unwrap();
        assert_eq!(s.saved, 4);
        assert_eq!(s.stop_reason, None);
    }
}
