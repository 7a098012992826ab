//! Schedule data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extraction::FilterSet;
use crate::mission::MissionLimits;

/// A persisted recurring mission trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub owner_id: String,
    pub keyword: String,
    pub cron_expression: String,
    pub is_active: bool,
    pub limits: MissionLimits,
    pub filters: FilterSet,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one scheduled execution, after retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
