//! The storage boundary shared by the engine, the supervisor and the scheduler

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::PersistenceResult;
use crate::extraction::ExtractedRecord;
use crate::mission::{Mission, MissionCounters, MissionStatus};
use crate::scheduler::{RunOutcome, Schedule};

/// Dedup-aware record storage plus mission and schedule bookkeeping
///
/// Counter updates are atomic `+n` increments or per-counter maxima, so
/// concurrent writers can never make a counter go backwards.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a record; `false` means the dedup key already existed
    async fn save_record(&self, record: &ExtractedRecord, owner_id: &str)
    -> PersistenceResult<bool>;

    /// Records persisted for `owner_id` since UTC midnight
    async fn count_today(&self, owner_id: &str) -> PersistenceResult<u64>;

    /// Most recent records of an owner, newest first
    async fn list_records(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<ExtractedRecord>>;

    async fn insert_mission(&self, mission: &Mission) -> PersistenceResult<()>;

    async fn get_mission(&self, mission_id: &str) -> PersistenceResult<Option<Mission>>;

    /// Missions of an owner, newest first
    async fn list_missions(&self, owner_id: &str, limit: usize) -> PersistenceResult<Vec<Mission>>;

    async fn increment_counters(
        &self,
        mission_id: &str,
        delta: &MissionCounters,
    ) -> PersistenceResult<()>;

    /// Raise each counter to at least the observed value
    async fn reconcile_counters(
        &self,
        mission_id: &str,
        observed: &MissionCounters,
    ) -> PersistenceResult<()>;

    /// Move a running mission into a terminal status
    ///
    /// Returns `false` without touching the row if it is already terminal.
    async fn finalize_mission(
        &self,
        mission_id: &str,
        status: MissionStatus,
        error: Option<&str>,
    ) -> PersistenceResult<bool>;

    /// Fail every mission still marked running; returns how many were touched
    async fn fail_orphans(&self, reason: &str) -> PersistenceResult<u64>;

    async fn insert_schedule(&self, schedule: &Schedule) -> PersistenceResult<()>;

    /// Overwrite the configurable fields and timestamps of a schedule
    async fn update_schedule(&self, schedule: &Schedule) -> PersistenceResult<()>;

    async fn get_schedule(&self, schedule_id: &str) -> PersistenceResult<Option<Schedule>>;

    async fn find_schedule(
        &self,
        owner_id: &str,
        keyword: &str,
    ) -> PersistenceResult<Option<Schedule>>;

    async fn list_schedules(&self, owner_id: &str) -> PersistenceResult<Vec<Schedule>>;

    async fn list_active_schedules(&self) -> PersistenceResult<Vec<Schedule>>;

    /// Returns whether a row was deleted
    async fn delete_schedule(&self, schedule_id: &str) -> PersistenceResult<bool>;

    /// Bump run totals and move `last_run`/`next_run` in one statement
    async fn record_run(
        &self,
        schedule_id: &str,
        outcome: RunOutcome,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()>;
}
