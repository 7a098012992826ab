mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{StaticPage, fast_config, invocation, marker_card, page_html};
use mission_scrape::extraction::{ExtractedRecord, ExtractionEngine, FilterSet, NoOpProgress};
use mission_scrape::mission::{Mission, MissionCounters, MissionLimits, MissionRequest, MissionStatus};
use mission_scrape::persistence::{PersistenceGateway, SqliteGateway};
use mission_scrape::scheduler::{RunOutcome, Schedule};
use tempfile::TempDir;

async fn file_store() -> (TempDir, SqliteGateway) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteGateway::open(&dir.path().join("missions.db")).await.unwrap();
    (dir, store)
}

fn record(advertiser: &str, description: &str) -> ExtractedRecord {
    ExtractedRecord {
        advertiser: advertiser.into(),
        description: description.into(),
        contact: None,
        location: None,
        source: "https://example.test/".into(),
        keyword: "shoes".into(),
        captured_at: Utc::now(),
    }
}

#[tokio::test]
async fn saving_is_idempotent_on_the_dedup_key() {
    let (_dir, store) = file_store().await;
    let r = record("Loja do Zé", "Sapatos de couro legítimo com frete grátis");

    assert!(store.save_record(&r, "u1").await.unwrap());
    assert!(!store.save_record(&r, "u1").await.unwrap());
    assert!(store.save_record(&r, "u2").await.unwrap());
    assert_eq!(store.count_today("u1").await.unwrap(), 1);
    assert_eq!(store.list_records("u1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_saves_do_not_bump_the_saved_counter() {
    let (_dir, store) = file_store().await;
    let store = Arc::new(store);
    let engine = ExtractionEngine::new(fast_config(), store.clone());
    let html = page_html(&[marker_card("Loja A", "Bolsas artesanais feitas à mão no Ceará")]);

    let first = engine
        .run(&StaticPage::new(html.clone()), &invocation(5), &NoOpProgress)
        .await
        .unwrap();
    let second = engine
        .run(&StaticPage::new(html), &invocation(5), &NoOpProgress)
        .await
        .unwrap();

    assert_eq!((first.saved, first.duplicates), (1, 0));
    assert_eq!((second.saved, second.duplicates), (0, 1));
}

#[tokio::test]
async fn mission_status_is_write_once() {
    let (_dir, store) = file_store().await;
    let mission = Mission::start(&MissionRequest::manual("u1", "shoes", MissionLimits::new(10, 100)));
    store.insert_mission(&mission).await.unwrap();

    assert!(store.finalize_mission(&mission.id, MissionStatus::Completed, None).await.unwrap());
    assert!(!store.finalize_mission(&mission.id, MissionStatus::Failed, Some("late")).await.unwrap());
    assert!(!store.finalize_mission(&mission.id, MissionStatus::Stopped, None).await.unwrap());

    let stored = store.get_mission(&mission.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MissionStatus::Completed);
    assert!(stored.error.is_none());
    assert!(stored.end_time.is_some());
}

#[tokio::test]
async fn counters_only_move_forward() {
    let (_dir, store) = file_store().await;
    let mission = Mission::start(&MissionRequest::manual("u1", "shoes", MissionLimits::new(10, 100)));
    store.insert_mission(&mission).await.unwrap();

    let saved = MissionCounters { new_records: 1, processed: 1, ..MissionCounters::default() };
    for _ in 0..4 {
        store.increment_counters(&mission.id, &saved).await.unwrap();
    }
    let under_report = MissionCounters { found: 9, new_records: 2, duplicates_skipped: 0, processed: 2 };
    store.reconcile_counters(&mission.id, &under_report).await.unwrap();

    let counters = store.get_mission(&mission.id).await.unwrap().unwrap().counters;
    assert_eq!(
        counters,
        MissionCounters { found: 9, new_records: 4, duplicates_skipped: 0, processed: 4 }
    );
}

#[tokio::test]
async fn orphans_fail_and_history_is_newest_first() {
    let (_dir, store) = file_store().await;
    let older = Mission::start(&MissionRequest::manual("u1", "a", MissionLimits::new(1, 1)));
    let mut newer = Mission::start(&MissionRequest::manual("u1", "b", MissionLimits::new(1, 1)));
    newer.start_time = older.start_time + Duration::seconds(5);
    store.insert_mission(&older).await.unwrap();
    store.insert_mission(&newer).await.unwrap();
    store.finalize_mission(&newer.id, MissionStatus::Completed, None).await.unwrap();

    assert_eq!(store.fail_orphans("restarted").await.unwrap(), 1);

    let history = store.list_missions("u1", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, newer.id);
    assert_eq!(history[0].status, MissionStatus::Completed);
    assert_eq!(history[1].status, MissionStatus::Failed);
    assert_eq!(history[1].error.as_deref(), Some("restarted"));
}

#[tokio::test]
async fn schedules_round_trip_and_count_runs() {
    let (_dir, store) = file_store().await;
    let now = Utc::now();
    let schedule = Schedule {
        id: "s1".into(),
        owner_id: "u1".into(),
        keyword: "shoes".into(),
        cron_expression: "*/5 * * * *".into(),
        is_active: true,
        limits: MissionLimits::new(50, 200),
        filters: FilterSet::default(),
        last_run: None,
        next_run: Some(now + Duration::minutes(5)),
        total_runs: 0,
        successful_runs: 0,
        failed_runs: 0,
        created_at: now,
        updated_at: now,
    };
    store.insert_schedule(&schedule).await.unwrap();

    let duplicate = Schedule { id: "s2".into(), ..schedule.clone() };
    assert!(store.insert_schedule(&duplicate).await.is_err());

    store
        .record_run("s1", RunOutcome::Success, now, Some(now + Duration::minutes(5)))
        .await
        .unwrap();
    store
        .record_run("s1", RunOutcome::Failure, now, Some(now + Duration::minutes(10)))
        .await
        .unwrap();

    let found = store.find_schedule("u1", "shoes").await.unwrap().unwrap();
    assert_eq!((found.total_runs, found.successful_runs, found.failed_runs), (2, 1, 1));
    assert_eq!(found.limits, MissionLimits::new(50, 200));
    assert_eq!(store.list_active_schedules().await.unwrap().len(), 1);

    assert!(store.delete_schedule("s1").await.unwrap());
    assert!(store.get_schedule("s1").await.unwrap().is_none());
}
