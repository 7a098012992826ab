//! Mission data model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extraction::{FilterSet, MissionSummary, ProgressEvent};

/// Lifecycle state of a mission
///
/// A mission is created already `Running`; the other states are terminal
/// and written exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl MissionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown mission status '{other}'")),
        }
    }
}

/// Who started the mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionSource {
    #[default]
    Manual,
    Scheduled,
}

impl MissionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl FromStr for MissionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(format!("unknown mission source '{other}'")),
        }
    }
}

/// Progress counters of one mission
///
/// Also used as a delta for atomic increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionCounters {
    pub found: u64,
    pub new_records: u64,
    pub duplicates_skipped: u64,
    pub processed: u64,
}

impl MissionCounters {
    /// The increment a single progress event stands for
    #[must_use]
    pub fn delta_for(event: &ProgressEvent) -> Option<Self> {
        let delta = match event {
            ProgressEvent::RecordsDiscovered(n) => Self {
                found: *n,
                ..Self::default()
            },
            ProgressEvent::RecordSaved => Self {
                new_records: 1,
                processed: 1,
                ..Self::default()
            },
            ProgressEvent::DuplicateSkipped => Self {
                duplicates_skipped: 1,
                processed: 1,
                ..Self::default()
            },
            ProgressEvent::RecordFailed => Self {
                processed: 1,
                ..Self::default()
            },
            ProgressEvent::Summary(_) => return None,
        };
        Some(delta)
    }

    pub fn add(&mut self, delta: &Self) {
        self.found += delta.found;
        self.new_records += delta.new_records;
        self.duplicates_skipped += delta.duplicates_skipped;
        self.processed += delta.processed;
    }

    /// Per-counter maximum
    #[must_use]
    pub fn max_with(&self, other: &Self) -> Self {
        Self {
            found: self.found.max(other.found),
            new_records: self.new_records.max(other.new_records),
            duplicates_skipped: self.duplicates_skipped.max(other.duplicates_skipped),
            processed: self.processed.max(other.processed),
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&MissionSummary> for MissionCounters {
    fn from(summary: &MissionSummary) -> Self {
        Self {
            found: summary.found,
            new_records: summary.saved,
            duplicates_skipped: summary.duplicates,
            processed: summary.processed,
        }
    }
}

/// Per-mission budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionLimits {
    pub max_records: u64,
    pub daily_quota: u64,
}

impl MissionLimits {
    #[must_use]
    pub const fn new(max_records: u64, daily_quota: u64) -> Self {
        Self {
            max_records,
            daily_quota,
        }
    }
}

/// Persisted mission record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub keyword: String,
    pub status: MissionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub counters: MissionCounters,
    pub limits: MissionLimits,
    pub owner_id: String,
    pub source: MissionSource,
    /// Schedule id for scheduled missions
    pub execution_id: Option<String>,
    pub filters: FilterSet,
    /// Failure reason for failed missions
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// A fresh mission in the `Running` state
    #[must_use]
    pub fn start(request: &MissionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            keyword: request.keyword.clone(),
            status: MissionStatus::Running,
            start_time: now,
            end_time: None,
            counters: MissionCounters::default(),
            limits: request.limits,
            owner_id: request.owner_id.clone(),
            source: request.source,
            execution_id: request.execution_id.clone(),
            filters: request.filters.clone(),
            error: None,
            updated_at: now,
        }
    }
}

/// Parameters of `MissionSupervisor::create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequest {
    pub owner_id: String,
    pub keyword: String,
    pub limits: MissionLimits,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub source: MissionSource,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub resume_cutoff: Option<chrono::NaiveDate>,
}

impl MissionRequest {
    #[must_use]
    pub fn manual(owner_id: impl Into<String>, keyword: impl Into<String>, limits: MissionLimits) -> Self {
        Self {
            owner_id: owner_id.into(),
            keyword: keyword.into(),
            limits,
            filters: FilterSet::default(),
            source: MissionSource::Manual,
            execution_id: None,
            resume_cutoff: None,
        }
    }
}

/// Live view of a running mission, as returned by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMission {
    pub mission_id: String,
    pub keyword: String,
    pub counters: MissionCounters,
    pub started_at: DateTime<Utc>,
}
