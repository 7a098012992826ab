//! In-memory persistence gateway
//!
//! Same semantics as the SQLite gateway, kept behind one lock. Used for
//! one-off runs without a database and throughout the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::Mutex;

use super::errors::{PersistenceError, PersistenceResult};
use super::gateway::PersistenceGateway;
use crate::extraction::ExtractedRecord;
use crate::mission::{Mission, MissionCounters, MissionStatus};
use crate::scheduler::{RunOutcome, Schedule};

#[derive(Default)]
struct State {
    records: Vec<(String, ExtractedRecord)>,
    dedup: HashSet<(String, String, String)>,
    missions: HashMap<String, Mission>,
    schedules: HashMap<String, Schedule>,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
    fail_saves: AtomicBool,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save_record` fail, to exercise persistence-error paths
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save_record(
        &self,
        record: &ExtractedRecord,
        owner_id: &str,
    ) -> PersistenceResult<bool> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("saves disabled".to_string()));
        }
        let mut state = self.state.lock();
        let key = (
            owner_id.to_string(),
            record.advertiser.clone(),
            record.description.clone(),
        );
        if !state.dedup.insert(key) {
            return Ok(false);
        }
        state.records.push((owner_id.to_string(), record.clone()));
        Ok(true)
    }

    async fn count_today(&self, owner_id: &str) -> PersistenceResult<u64> {
        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let state = self.state.lock();
        let count = state
            .records
            .iter()
            .filter(|(owner, r)| owner == owner_id && r.captured_at >= midnight)
            .count();
        Ok(count as u64)
    }

    async fn list_records(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<ExtractedRecord>> {
        let state = self.state.lock();
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|(owner, _)| owner == owner_id)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn insert_mission(&self, mission: &Mission) -> PersistenceResult<()> {
        self.state
            .lock()
            .missions
            .insert(mission.id.clone(), mission.clone());
        Ok(())
    }

    async fn get_mission(&self, mission_id: &str) -> PersistenceResult<Option<Mission>> {
        Ok(self.state.lock().missions.get(mission_id).cloned())
    }

    async fn list_missions(&self, owner_id: &str, limit: usize) -> PersistenceResult<Vec<Mission>> {
        let state = self.state.lock();
        let mut missions: Vec<Mission> = state
            .missions
            .values()
            .filter(|m| m.owner_id == owner_id)
            .cloned()
            .collect();
        missions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        missions.truncate(limit);
        Ok(missions)
    }

    async fn increment_counters(
        &self,
        mission_id: &str,
        delta: &MissionCounters,
    ) -> PersistenceResult<()> {
        if let Some(mission) = self.state.lock().missions.get_mut(mission_id) {
            mission.counters.add(delta);
            mission.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reconcile_counters(
        &self,
        mission_id: &str,
        observed: &MissionCounters,
    ) -> PersistenceResult<()> {
        if let Some(mission) = self.state.lock().missions.get_mut(mission_id) {
            mission.counters = mission.counters.max_with(observed);
            mission.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn finalize_mission(
        &self,
        mission_id: &str,
        status: MissionStatus,
        error: Option<&str>,
    ) -> PersistenceResult<bool> {
        let mut state = self.state.lock();
        let Some(mission) = state.missions.get_mut(mission_id) else {
            return Ok(false);
        };
        if mission.status.is_terminal() {
            return Ok(false);
        }
        let now = Utc::now();
        mission.status = status;
        mission.end_time = Some(now);
        mission.error = error.map(ToString::to_string);
        mission.updated_at = now;
        Ok(true)
    }

    async fn fail_orphans(&self, reason: &str) -> PersistenceResult<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut touched = 0;
        for mission in state.missions.values_mut() {
            if mission.status == MissionStatus::Running {
                mission.status = MissionStatus::Failed;
                mission.end_time = Some(now);
                mission.error = Some(reason.to_string());
                mission.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> PersistenceResult<()> {
        let mut state = self.state.lock();
        let clash = state
            .schedules
            .values()
            .any(|s| s.owner_id == schedule.owner_id && s.keyword == schedule.keyword);
        if clash {
            return Err(PersistenceError::Unavailable(format!(
                "schedule for ({}, {}) already exists",
                schedule.owner_id, schedule.keyword
            )));
        }
        state.schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> PersistenceResult<()> {
        if let Some(stored) = self.state.lock().schedules.get_mut(&schedule.id) {
            stored.cron_expression.clone_from(&schedule.cron_expression);
            stored.is_active = schedule.is_active;
            stored.limits = schedule.limits;
            stored.filters = schedule.filters.clone();
            stored.next_run = schedule.next_run;
            stored.updated_at = schedule.updated_at;
        }
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: &str) -> PersistenceResult<Option<Schedule>> {
        Ok(self.state.lock().schedules.get(schedule_id).cloned())
    }

    async fn find_schedule(
        &self,
        owner_id: &str,
        keyword: &str,
    ) -> PersistenceResult<Option<Schedule>> {
        Ok(self
            .state
            .lock()
            .schedules
            .values()
            .find(|s| s.owner_id == owner_id && s.keyword == keyword)
            .cloned())
    }

    async fn list_schedules(&self, owner_id: &str) -> PersistenceResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .state
            .lock()
            .schedules
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    async fn list_active_schedules(&self) -> PersistenceResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .state
            .lock()
            .schedules
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    async fn delete_schedule(&self, schedule_id: &str) -> PersistenceResult<bool> {
        Ok(self.state.lock().schedules.remove(schedule_id).is_some())
    }

    async fn record_run(
        &self,
        schedule_id: &str,
        outcome: RunOutcome,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()> {
        if let Some(schedule) = self.state.lock().schedules.get_mut(schedule_id) {
            schedule.total_runs += 1;
            if outcome.is_success() {
                schedule.successful_runs += 1;
            } else {
                schedule.failed_runs += 1;
            }
            schedule.last_run = Some(ran_at);
            schedule.next_run = next_run;
            schedule.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::{MissionLimits, MissionRequest};

    #[tokio::test]
    async fn write_once_matches_sqlite_semantics() {
        let store = MemoryGateway::new();
        let mission = Mission::start(&MissionRequest::manual("u1", "x", MissionLimits::new(1, 1)));
        store.insert_mission(&mission).await.unwrap();
        assert!(store.finalize_mission(&mission.id, MissionStatus::Stopped, None).await.unwrap());
        assert!(!store.finalize_mission(&mission.id, MissionStatus::Completed, None).await.unwrap());
        assert_eq!(
            store.get_mission(&mission.id).await.unwrap().unwrap().status,
            MissionStatus::Stopped
        );
        assert!(!store.finalize_mission("missing", MissionStatus::Failed, None).await.unwrap());
    }

    #[tokio::test]
    async fn failing_saves_surface_as_errors() {
        let store = MemoryGateway::new();
        store.set_fail_saves(true);
        let record = ExtractedRecord {
            advertiser: "a".into(),
            description: "b".into(),
            contact: None,
            location: None,
            source: "s".into(),
            keyword: "k".into(),
            captured_at: Utc::now(),
        };
        assert!(store.save_record(&record, "u1").await.is_err());
        assert_eq!(store.record_count(), 0);
    }
}
