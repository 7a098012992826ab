mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{Ending, ScriptedLauncher, WorkerScript, until_active};
use mission_scrape::config::{SchedulerConfig, SupervisorConfig};
use mission_scrape::extraction::FilterSet;
use mission_scrape::mission::{
    MissionLimits, MissionSource, MissionStatus, MissionSupervisor, WorkerExit,
};
use mission_scrape::persistence::{MemoryGateway, PersistenceGateway};
use mission_scrape::scheduler::{Backoff, JobScheduler, RunOutcome, Schedule, SchedulerError};

/// Scheduler that retries immediately
fn scheduler(launcher: Arc<ScriptedLauncher>, config: SchedulerConfig) -> (JobScheduler, Arc<MemoryGateway>) {
    let store = Arc::new(MemoryGateway::new());
    let supervisor = MissionSupervisor::new(store.clone(), launcher, SupervisorConfig::default());
    let instant = Backoff::new(Duration::ZERO, 1.0, Duration::ZERO, 0.0);
    let scheduler = JobScheduler::with_backoff(store.clone(), supervisor, config, instant);
    (scheduler, store)
}

/// A stored but unarmed schedule, driven by calling `run_tick` directly
async fn unarmed(store: &MemoryGateway, id: &str, cron: &str, active: bool) -> Schedule {
    let now = Utc::now();
    let schedule = Schedule {
        id: id.into(),
        owner_id: "u1".into(),
        keyword: format!("keyword-{id}"),
        cron_expression: cron.into(),
        is_active: active,
        limits: MissionLimits::new(50, 200),
        filters: FilterSet::default(),
        last_run: None,
        next_run: None,
        total_runs: 0,
        successful_runs: 0,
        failed_runs: 0,
        created_at: now,
        updated_at: now,
    };
    store.insert_schedule(&schedule).await.unwrap();
    schedule
}

#[tokio::test]
async fn add_schedule_stores_and_arms() {
    let (scheduler, _store) = scheduler(ScriptedLauncher::new(Vec::new()), SchedulerConfig::default());

    let schedule = scheduler
        .add_schedule("u1", "shoes", "*/5 * * * *", MissionLimits::new(50, 200))
        .await
        .unwrap();

    assert!(schedule.is_active);
    assert!(schedule.next_run.unwrap() > Utc::now());
    assert_eq!(schedule.total_runs, 0);
    assert!(scheduler.is_armed(&schedule.id));

    // Same (owner, keyword) reconfigures instead of duplicating
    let again = scheduler
        .add_schedule("u1", "shoes", "0  9 * * 1", MissionLimits::new(10, 20))
        .await
        .unwrap();
    assert_eq!(again.id, schedule.id);
    assert_eq!(again.cron_expression, "0 9 * * 1");
    assert_eq!(again.limits, MissionLimits::new(10, 20));
    assert_eq!(scheduler.list("u1").await.unwrap().len(), 1);
    assert_eq!(scheduler.armed_count(), 1);

    scheduler.shutdown();
    assert_eq!(scheduler.armed_count(), 0);
}

#[tokio::test]
async fn invalid_cron_stores_nothing() {
    let (scheduler, _store) = scheduler(ScriptedLauncher::new(Vec::new()), SchedulerConfig::default());

    for bad in ["* * *", "61 * * * *", "* * * * * *", ""] {
        let err = scheduler
            .add_schedule("u1", "shoes", bad, MissionLimits::new(50, 200))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron(_)), "{bad:?} gave {err}");
    }
    assert!(scheduler.list("u1").await.unwrap().is_empty());
    assert_eq!(scheduler.armed_count(), 0);
}

#[tokio::test]
async fn ticks_accumulate_run_counters() {
    let launcher = ScriptedLauncher::new(vec![
        WorkerScript::completes_with(Vec::new()),
        WorkerScript::fails("blocked"),
        WorkerScript::fails("blocked"),
        WorkerScript::fails("blocked"),
        WorkerScript::completes_with(Vec::new()),
    ]);
    let (scheduler, store) = scheduler(launcher.clone(), SchedulerConfig::default());
    let schedule = unarmed(&store, "s1", "0 */6 * * *", true).await;

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(scheduler.run_tick(&schedule).await.unwrap());
        let stored = store.get_schedule("s1").await.unwrap().unwrap();
        assert!(stored.next_run.unwrap() > stored.last_run.unwrap());
    }

    assert_eq!(outcomes, [RunOutcome::Success, RunOutcome::Failure, RunOutcome::Success]);
    let stored = store.get_schedule("s1").await.unwrap().unwrap();
    assert_eq!(
        (stored.total_runs, stored.successful_runs, stored.failed_runs),
        (3, 2, 1)
    );
    assert_eq!(launcher.launches().len(), 5);
}

#[tokio::test]
async fn a_retry_that_succeeds_counts_as_success() {
    let launcher = ScriptedLauncher::new(vec![
        WorkerScript::fails("blocked"),
        WorkerScript::completes_with(Vec::new()),
    ]);
    let (scheduler, store) = scheduler(launcher.clone(), SchedulerConfig::default());
    let schedule = unarmed(&store, "s1", "*/5 * * * *", true).await;

    assert_eq!(scheduler.run_tick(&schedule).await.unwrap(), RunOutcome::Success);
    assert_eq!(launcher.launches().len(), 2);

    let missions = store.list_missions("u1", 10).await.unwrap();
    let statuses: Vec<MissionStatus> = missions.iter().map(|m| m.status).collect();
    assert!(statuses.contains(&MissionStatus::Failed));
    assert!(statuses.contains(&MissionStatus::Completed));
}

#[tokio::test]
async fn stopped_mission_is_a_failed_run_without_retry() {
    let launcher = ScriptedLauncher::new(vec![WorkerScript {
        events: Vec::new(),
        ending: Ending::Exit(WorkerExit::Killed),
    }]);
    let (scheduler, store) = scheduler(launcher.clone(), SchedulerConfig::default());
    let schedule = unarmed(&store, "s1", "*/5 * * * *", true).await;

    assert_eq!(scheduler.run_tick(&schedule).await.unwrap(), RunOutcome::Failure);
    assert_eq!(launcher.launches().len(), 1);
    let stored = store.get_schedule("s1").await.unwrap().unwrap();
    assert_eq!((stored.total_runs, stored.failed_runs), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn execution_timeout_force_fails_the_mission() {
    let config = SchedulerConfig {
        max_attempts: 1,
        execution_timeout_secs: 1,
        ..SchedulerConfig::default()
    };
    let (scheduler, store) = scheduler(ScriptedLauncher::new(vec![WorkerScript::holds()]), config);
    let schedule = unarmed(&store, "s1", "*/5 * * * *", true).await;

    assert_eq!(scheduler.run_tick(&schedule).await.unwrap(), RunOutcome::Failure);

    let missions = store.list_missions("u1", 10).await.unwrap();
    assert_eq!(missions.len(), 1);
    assert_eq!(missions[0].status, MissionStatus::Failed);
    assert_eq!(missions[0].error.as_deref(), Some("scheduler execution timeout"));
    assert!(scheduler.supervisor().status("u1").await.is_empty());
}

#[tokio::test]
async fn scheduled_invocations_carry_the_schedule() {
    let launcher = ScriptedLauncher::new(Vec::new());
    let (scheduler, store) = scheduler(launcher.clone(), SchedulerConfig::default());
    let schedule = unarmed(&store, "s1", "*/5 * * * *", true).await;

    scheduler.run_tick(&schedule).await.unwrap();
    let ticked = store.get_schedule("s1").await.unwrap().unwrap();
    scheduler.run_tick(&ticked).await.unwrap();

    let launches = launcher.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches.iter().all(|inv| inv.owner_id == "u1"));
    assert!(launches.iter().all(|inv| inv.keyword == "keyword-s1"));
    assert!(launches[0].resume_cutoff.is_none());
    assert_eq!(launches[1].resume_cutoff, ticked.last_run.map(|t| t.date_naive()));

    let missions = store.list_missions("u1", 10).await.unwrap();
    assert!(missions.iter().all(|m| m.source == MissionSource::Scheduled));
    assert!(missions.iter().all(|m| m.execution_id.as_deref() == Some("s1")));
}

#[tokio::test]
async fn pause_resume_and_remove_check_ownership() {
    let (scheduler, _store) = scheduler(ScriptedLauncher::new(Vec::new()), SchedulerConfig::default());
    let schedule = scheduler
        .add_schedule("u1", "shoes", "*/5 * * * *", MissionLimits::new(50, 200))
        .await
        .unwrap();

    assert!(matches!(
        scheduler.pause("u2", &schedule.id).await,
        Err(SchedulerError::PermissionDenied { .. })
    ));
    assert!(scheduler.is_armed(&schedule.id));

    let paused = scheduler.pause("u1", &schedule.id).await.unwrap();
    assert!(!paused.is_active);
    assert!(!scheduler.is_armed(&schedule.id));

    let resumed = scheduler.resume("u1", &schedule.id).await.unwrap();
    assert!(resumed.is_active);
    assert!(resumed.next_run.unwrap() > Utc::now());
    assert!(scheduler.is_armed(&schedule.id));

    assert!(matches!(
        scheduler.remove("u2", &schedule.id).await,
        Err(SchedulerError::PermissionDenied { .. })
    ));
    scheduler.remove("u1", &schedule.id).await.unwrap();
    assert!(!scheduler.is_armed(&schedule.id));
    assert!(matches!(
        scheduler.get("u1", &schedule.id).await,
        Err(SchedulerError::NotFound(_))
    ));
    assert!(matches!(
        scheduler.resume("u1", "missing").await,
        Err(SchedulerError::NotFound(_))
    ));
}

#[tokio::test]
async fn restore_arms_only_active_schedules() {
    let (scheduler, store) = scheduler(ScriptedLauncher::new(Vec::new()), SchedulerConfig::default());
    let active = unarmed(&store, "s1", "0 3 * * *", true).await;
    let paused = unarmed(&store, "s2", "0 4 * * *", false).await;

    assert_eq!(scheduler.restore().await.unwrap(), 1);
    assert!(scheduler.is_armed(&active.id));
    assert!(!scheduler.is_armed(&paused.id));

    scheduler.shutdown();
    assert_eq!(scheduler.armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rearming_waits_for_the_tick_in_flight() {
    let launcher = ScriptedLauncher::new(vec![WorkerScript::holds(), WorkerScript::holds()]);
    let (scheduler, store) = scheduler(launcher.clone(), SchedulerConfig::default());
    let mut due = unarmed(&store, "s1", "*/5 * * * *", true).await;
    due.next_run = Some(Utc::now() - chrono::Duration::minutes(1));
    store.update_schedule(&due).await.unwrap();

    scheduler.restore().await.unwrap();
    until_active(scheduler.supervisor(), "u1", 1).await;

    // The stored next_run is still due, so the new job wakes at once
    scheduler.restore().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(launcher.launches().len(), 1);
    let active = scheduler.supervisor().status("u1").await;
    assert_eq!(active.len(), 1);

    scheduler.supervisor().stop(&active[0].mission_id, "u1").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stored = store.get_schedule("s1").await.unwrap().unwrap();
    assert_eq!((stored.total_runs, stored.failed_runs), (1, 1));
    assert!(stored.next_run.unwrap() > due.next_run.unwrap());
    assert_eq!(launcher.launches().len(), 1);
    assert!(scheduler.is_armed("s1"));

    scheduler.shutdown();
}
