//! Recurring mission scheduler
//!
//! Every active schedule is armed as one tokio task that sleeps until its
//! `next_run`, runs a tick through the supervisor and records the outcome.
//! Each task listens on a child of the scheduler's shutdown token so a
//! single schedule can be disarmed without touching the others.
//! Ticks of one schedule never overlap: a re-armed job waits for the tick
//! its predecessor still has in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::cron::CronSchedule;
use super::errors::{SchedulerError, SchedulerResult};
use super::types::{RunOutcome, Schedule};
use crate::config::SchedulerConfig;
use crate::extraction::FilterSet;
use crate::mission::{MissionLimits, MissionRequest, MissionSource, MissionStatus, MissionSupervisor};
use crate::persistence::PersistenceGateway;

/// Pause before re-reading a schedule the store failed to return
const STORE_RETRY_DELAY: Duration = Duration::from_secs(60);

struct ArmedJob {
    generation: u64,
    token: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) store: Arc<dyn PersistenceGateway>,
    pub(crate) supervisor: MissionSupervisor,
    pub(crate) config: SchedulerConfig,
    backoff: Backoff,
    jobs: DashMap<String, ArmedJob>,
    ticks: DashMap<String, Arc<Mutex<()>>>,
    generation: AtomicU64,
    pub(crate) shutdown: CancellationToken,
}

/// Cron-driven mission scheduler
///
/// Cheap to clone; clones share armed jobs and the shutdown token.
#[derive(Clone)]
pub struct JobScheduler {
    pub(crate) inner: Arc<Inner>,
}

impl JobScheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        supervisor: MissionSupervisor,
        config: SchedulerConfig,
    ) -> Self {
        let backoff = Backoff::from_config(&config);
        Self::with_backoff(store, supervisor, config, backoff)
    }

    /// Scheduler with an explicit retry delay policy
    #[must_use]
    pub fn with_backoff(
        store: Arc<dyn PersistenceGateway>,
        supervisor: MissionSupervisor,
        config: SchedulerConfig,
        backoff: Backoff,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                supervisor,
                config,
                backoff,
                jobs: DashMap::new(),
                ticks: DashMap::new(),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn supervisor(&self) -> &MissionSupervisor {
        &self.inner.supervisor
    }

    /// Create or reconfigure the (owner, keyword) schedule and arm it
    ///
    /// # Errors
    ///
    /// `InvalidCron` before anything is stored, `Persistence` on store failure.
    pub async fn add_schedule(
        &self,
        owner_id: &str,
        keyword: &str,
        cron_expression: &str,
        limits: MissionLimits,
    ) -> SchedulerResult<Schedule> {
        self.add_filtered_schedule(owner_id, keyword, cron_expression, limits, FilterSet::default())
            .await
    }

    /// [`add_schedule`](Self::add_schedule) with search filters
    ///
    /// # Errors
    ///
    /// See [`add_schedule`](Self::add_schedule).
    pub async fn add_filtered_schedule(
        &self,
        owner_id: &str,
        keyword: &str,
        cron_expression: &str,
        limits: MissionLimits,
        filters: FilterSet,
    ) -> SchedulerResult<Schedule> {
        let cron = CronSchedule::parse(cron_expression)?;
        let now = Utc::now();
        let next_run = cron.next_after(&now)?;

        let store = &self.inner.store;
        let schedule = match store.find_schedule(owner_id, keyword).await? {
            Some(mut existing) => {
                existing.cron_expression = cron.expression().to_string();
                existing.is_active = true;
                existing.limits = limits;
                existing.filters = filters;
                existing.next_run = Some(next_run);
                existing.updated_at = now;
                store.update_schedule(&existing).await?;
                info!(schedule_id = %existing.id, owner_id, keyword, cron = cron.expression(), "Schedule reconfigured");
                existing
            }
            None => {
                let schedule = Schedule {
                    id: uuid::Uuid::new_v4().to_string(),
                    owner_id: owner_id.to_string(),
                    keyword: keyword.to_string(),
                    cron_expression: cron.expression().to_string(),
                    is_active: true,
                    limits,
                    filters,
                    last_run: None,
                    next_run: Some(next_run),
                    total_runs: 0,
                    successful_runs: 0,
                    failed_runs: 0,
                    created_at: now,
                    updated_at: now,
                };
                store.insert_schedule(&schedule).await?;
                info!(schedule_id = %schedule.id, owner_id, keyword, cron = cron.expression(), "Schedule created");
                schedule
            }
        };

        self.arm(&schedule.id);
        Ok(schedule)
    }

    /// Deactivate a schedule and disarm its job
    ///
    /// # Errors
    ///
    /// `NotFound`, `PermissionDenied` or `Persistence`.
    pub async fn pause(&self, owner_id: &str, schedule_id: &str) -> SchedulerResult<Schedule> {
        let mut schedule = self.owned(owner_id, schedule_id).await?;
        schedule.is_active = false;
        schedule.updated_at = Utc::now();
        self.inner.store.update_schedule(&schedule).await?;
        self.disarm(schedule_id);
        info!(schedule_id, owner_id, "Schedule paused");
        Ok(schedule)
    }

    /// Reactivate a paused schedule from the next cron occurrence
    ///
    /// # Errors
    ///
    /// `NotFound`, `PermissionDenied`, `InvalidCron` or `Persistence`.
    pub async fn resume(&self, owner_id: &str, schedule_id: &str) -> SchedulerResult<Schedule> {
        let mut schedule = self.owned(owner_id, schedule_id).await?;
        let cron = CronSchedule::parse(&schedule.cron_expression)?;
        let now = Utc::now();
        schedule.is_active = true;
        schedule.next_run = Some(cron.next_after(&now)?);
        schedule.updated_at = now;
        self.inner.store.update_schedule(&schedule).await?;
        self.arm(schedule_id);
        info!(schedule_id, owner_id, "Schedule resumed");
        Ok(schedule)
    }

    /// Disarm and delete a schedule
    ///
    /// # Errors
    ///
    /// `NotFound`, `PermissionDenied` or `Persistence`.
    pub async fn remove(&self, owner_id: &str, schedule_id: &str) -> SchedulerResult<()> {
        self.owned(owner_id, schedule_id).await?;
        self.disarm(schedule_id);
        self.inner.ticks.remove(schedule_id);
        self.inner.store.delete_schedule(schedule_id).await?;
        info!(schedule_id, owner_id, "Schedule removed");
        Ok(())
    }

    /// Owner's schedules, oldest first
    ///
    /// # Errors
    ///
    /// Returns `Persistence` on store failure.
    pub async fn list(&self, owner_id: &str) -> SchedulerResult<Vec<Schedule>> {
        Ok(self.inner.store.list_schedules(owner_id).await?)
    }

    /// # Errors
    ///
    /// `NotFound`, `PermissionDenied` or `Persistence`.
    pub async fn get(&self, owner_id: &str, schedule_id: &str) -> SchedulerResult<Schedule> {
        self.owned(owner_id, schedule_id).await
    }

    /// Re-arm every active schedule after a restart
    ///
    /// Schedules whose `next_run` already passed fire right away.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the active schedules cannot be listed.
    pub async fn restore(&self) -> SchedulerResult<usize> {
        let schedules = self.inner.store.list_active_schedules().await?;
        for schedule in &schedules {
            self.arm(&schedule.id);
        }
        info!(restored = schedules.len(), "Restored active schedules");
        Ok(schedules.len())
    }

    /// Run one scheduled execution now and record its outcome
    ///
    /// `last_run` is the tick start; `next_run` is the first occurrence after
    /// the tick finished, so it is always later than `last_run`.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the outcome cannot be recorded.
    pub async fn run_tick(&self, schedule: &Schedule) -> SchedulerResult<RunOutcome> {
        let ran_at = Utc::now();
        let outcome = self.execute_with_retry(schedule).await;

        let next_run = match CronSchedule::parse(&schedule.cron_expression)
            .and_then(|cron| cron.next_after(&Utc::now()))
        {
            Ok(next) => Some(next),
            Err(e) => {
                error!(schedule_id = %schedule.id, "Cannot compute next run: {e}");
                None
            }
        };

        self.inner
            .store
            .record_run(&schedule.id, outcome, ran_at, next_run)
            .await?;
        info!(
            schedule_id = %schedule.id,
            success = outcome.is_success(),
            next_run = ?next_run,
            "Scheduled run recorded"
        );
        Ok(outcome)
    }

    /// Execute a schedule, retrying failed attempts with backoff
    ///
    /// A stopped mission is a failed run without retry.
    pub async fn execute_with_retry(&self, schedule: &Schedule) -> RunOutcome {
        let max_attempts = self.inner.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let error = match self.execute_once(schedule).await {
                Ok(MissionStatus::Completed) => return RunOutcome::Success,
                Ok(MissionStatus::Stopped) => {
                    info!(schedule_id = %schedule.id, "Scheduled mission was stopped, not retrying");
                    return RunOutcome::Failure;
                }
                Ok(status) => SchedulerError::Execution(format!("mission ended {status}")),
                Err(e) => e,
            };

            if attempt == max_attempts {
                error!(
                    schedule_id = %schedule.id,
                    attempts = max_attempts,
                    "Scheduled execution failed: {error}"
                );
                break;
            }

            let delay = self.inner.backoff.delay(attempt);
            warn!(
                schedule_id = %schedule.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduled execution failed, retrying: {error}"
            );
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        RunOutcome::Failure
    }

    async fn execute_once(&self, schedule: &Schedule) -> SchedulerResult<MissionStatus> {
        let request = MissionRequest {
            owner_id: schedule.owner_id.clone(),
            keyword: schedule.keyword.clone(),
            limits: schedule.limits,
            filters: schedule.filters.clone(),
            source: MissionSource::Scheduled,
            execution_id: Some(schedule.id.clone()),
            resume_cutoff: schedule.last_run.map(|t| t.date_naive()),
        };

        let supervisor = &self.inner.supervisor;
        let mission = supervisor.create(request).await?;
        let timeout = self.inner.config.execution_timeout();

        match tokio::time::timeout(timeout, supervisor.wait(&mission.id)).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                supervisor
                    .force_fail(&mission.id, "scheduler execution timeout")
                    .await?;
                Err(SchedulerError::Timeout {
                    mission_id: mission.id,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Number of armed jobs
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.inner.jobs.len()
    }

    #[must_use]
    pub fn is_armed(&self, schedule_id: &str) -> bool {
        self.inner.jobs.contains_key(schedule_id)
    }

    /// Cancel every armed job and monitor
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.jobs.clear();
        info!("Scheduler shut down");
    }

    fn arm(&self, schedule_id: &str) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let token = self.inner.shutdown.child_token();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let job = ArmedJob {
            generation,
            token: token.clone(),
        };
        if let Some(previous) = self.inner.jobs.insert(schedule_id.to_string(), job) {
            previous.token.cancel();
        }
        debug!(schedule_id, generation, "Schedule armed");
        tokio::spawn(run_job(
            self.clone(),
            schedule_id.to_string(),
            generation,
            token,
        ));
    }

    fn tick_lock(&self, schedule_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .ticks
            .entry(schedule_id.to_string())
            .or_default()
            .clone()
    }

    fn disarm(&self, schedule_id: &str) {
        if let Some((_, job)) = self.inner.jobs.remove(schedule_id) {
            job.token.cancel();
            debug!(schedule_id, "Schedule disarmed");
        }
    }

    async fn owned(&self, owner_id: &str, schedule_id: &str) -> SchedulerResult<Schedule> {
        let schedule = self
            .inner
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(schedule_id.to_string()))?;
        if schedule.owner_id != owner_id {
            return Err(SchedulerError::PermissionDenied {
                schedule_id: schedule_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        Ok(schedule)
    }
}

/// Sleep-then-tick loop of one armed schedule
async fn run_job(
    scheduler: JobScheduler,
    schedule_id: String,
    generation: u64,
    token: CancellationToken,
) {
    let mut last_tick: Option<DateTime<Utc>> = None;

    while !token.is_cancelled() {
        let schedule = match scheduler.inner.store.get_schedule(&schedule_id).await {
            Ok(Some(schedule)) if schedule.is_active => schedule,
            Ok(_) => break,
            Err(e) => {
                warn!(schedule_id = %schedule_id, "Failed to load schedule: {e}");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(STORE_RETRY_DELAY) => continue,
                }
            }
        };

        let wake_at = match schedule.next_run {
            Some(next) if last_tick.is_none_or(|tick| next > tick) => next,
            _ => match CronSchedule::parse(&schedule.cron_expression)
                .and_then(|cron| cron.next_after(&Utc::now()))
            {
                Ok(next) => next,
                Err(e) => {
                    error!(schedule_id = %schedule_id, "Disarming schedule: {e}");
                    break;
                }
            },
        };

        let wait = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        let lock = scheduler.tick_lock(&schedule_id);
        let _tick = tokio::select! {
            () = token.cancelled() => break,
            guard = lock.lock() => guard,
        };

        // Pick up edits made while sleeping or waiting for a previous tick
        let schedule = match scheduler.inner.store.get_schedule(&schedule_id).await {
            Ok(Some(fresh)) if fresh.is_active => fresh,
            Ok(_) => break,
            Err(_) => schedule,
        };
        if schedule.next_run.is_some_and(|next| next > wake_at) {
            debug!(schedule_id = %schedule_id, "Occurrence already run, sleeping again");
            continue;
        }

        last_tick = Some(Utc::now());
        if let Err(e) = scheduler.run_tick(&schedule).await {
            warn!(schedule_id = %schedule_id, "Failed to record scheduled run: {e}");
        }
    }

    scheduler
        .inner
        .jobs
        .remove_if(&schedule_id, |_, current| current.generation == generation);
}
