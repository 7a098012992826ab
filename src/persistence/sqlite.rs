//! SQLite-backed persistence gateway.
//!
//! Records, missions and schedules live in one database file. Dedup is
//! enforced by the `UNIQUE(owner_id, advertiser, description)` constraint,
//! status write-once by a `WHERE status = 'running'` guard, and counters
//! only ever move through `+n` or `MAX(...)` updates.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use log::{debug, info};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::errors::{PersistenceError, PersistenceResult};
use super::gateway::PersistenceGateway;
use crate::extraction::{ExtractedRecord, FilterSet};
use crate::mission::{Mission, MissionCounters, MissionLimits, MissionSource, MissionStatus};
use crate::scheduler::{RunOutcome, Schedule};

/// SQL schema for the mission database
const SCHEMA_SQL: &str = r#"
-- Extracted records, deduplicated per owner
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    advertiser TEXT NOT NULL,
    description TEXT NOT NULL,
    contact TEXT,
    location TEXT,
    source TEXT NOT NULL,
    keyword TEXT NOT NULL,
    captured_at INTEGER NOT NULL,
    UNIQUE(owner_id, advertiser, description)
);

-- Daily quota counting scans by owner and time
CREATE INDEX IF NOT EXISTS idx_records_owner_captured ON records(owner_id, captured_at);

CREATE TABLE IF NOT EXISTS missions (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    keyword TEXT NOT NULL,
    status TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    found INTEGER NOT NULL DEFAULT 0,
    new_records INTEGER NOT NULL DEFAULT 0,
    duplicates_skipped INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    max_records INTEGER NOT NULL,
    daily_quota INTEGER NOT NULL,
    source TEXT NOT NULL,
    execution_id TEXT,
    filters TEXT NOT NULL,
    error TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_missions_owner ON missions(owner_id, start_time);
CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);

CREATE TABLE IF NOT EXISTS schedules (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    keyword TEXT NOT NULL,
    cron_expression TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    max_records INTEGER NOT NULL,
    daily_quota INTEGER NOT NULL,
    filters TEXT NOT NULL,
    last_run INTEGER,
    next_run INTEGER,
    total_runs INTEGER NOT NULL DEFAULT 0,
    successful_runs INTEGER NOT NULL DEFAULT 0,
    failed_runs INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(owner_id, keyword)
);

CREATE INDEX IF NOT EXISTS idx_schedules_active ON schedules(is_active);
"#;

const MISSION_COLUMNS: &str = "id, owner_id, keyword, status, start_time, end_time, found, \
     new_records, duplicates_skipped, processed, max_records, daily_quota, source, \
     execution_id, filters, error, updated_at";

const SCHEDULE_COLUMNS: &str = "id, owner_id, keyword, cron_expression, is_active, max_records, \
     daily_quota, filters, last_run, next_run, total_runs, successful_runs, failed_runs, \
     created_at, updated_at";

/// Persistent mission store using SQLite with WAL mode
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open existing database or create a new one at `path`
    pub async fn open(path: &Path) -> PersistenceResult<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Opened mission database at {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests and one-off runs
    pub async fn open_in_memory() -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection that never expires, otherwise the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> PersistenceResult<Self> {
        // Idempotent: every statement is CREATE ... IF NOT EXISTS
        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn save_record(
        &self,
        record: &ExtractedRecord,
        owner_id: &str,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO records
                (owner_id, advertiser, description, contact, location, source, keyword, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(&record.advertiser)
        .bind(&record.description)
        .bind(&record.contact)
        .bind(&record.location)
        .bind(&record.source)
        .bind(&record.keyword)
        .bind(to_ms(record.captured_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_today(&self, owner_id: &str) -> PersistenceResult<u64> {
        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM records WHERE owner_id = ? AND captured_at >= ?")
                .bind(owner_id)
                .bind(to_ms(midnight))
                .fetch_one(&self.pool)
                .await?;
        Ok(from_i64(count))
    }

    async fn list_records(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> PersistenceResult<Vec<ExtractedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT advertiser, description, contact, location, source, keyword, captured_at
            FROM records WHERE owner_id = ?
            ORDER BY captured_at DESC, id DESC LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(to_i64(limit as u64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> PersistenceResult<ExtractedRecord> {
                Ok(ExtractedRecord {
                    advertiser: row.try_get("advertiser")?,
                    description: row.try_get("description")?,
                    contact: row.try_get("contact")?,
                    location: row.try_get("location")?,
                    source: row.try_get("source")?,
                    keyword: row.try_get("keyword")?,
                    captured_at: from_ms("records", row.try_get("captured_at")?)?,
                })
            })
            .collect()
    }

    async fn insert_mission(&self, mission: &Mission) -> PersistenceResult<()> {
        let filters = serde_json::to_string(&mission.filters)?;
        sqlx::query(&format!(
            "INSERT INTO missions ({MISSION_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&mission.id)
        .bind(&mission.owner_id)
        .bind(&mission.keyword)
        .bind(mission.status.as_str())
        .bind(to_ms(mission.start_time))
        .bind(mission.end_time.map(to_ms))
        .bind(to_i64(mission.counters.found))
        .bind(to_i64(mission.counters.new_records))
        .bind(to_i64(mission.counters.duplicates_skipped))
        .bind(to_i64(mission.counters.processed))
        .bind(to_i64(mission.limits.max_records))
        .bind(to_i64(mission.limits.daily_quota))
        .bind(mission.source.as_str())
        .bind(&mission.execution_id)
        .bind(filters)
        .bind(&mission.error)
        .bind(to_ms(mission.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_mission(&self, mission_id: &str) -> PersistenceResult<Option<Mission>> {
        let row = sqlx::query(&format!("SELECT {MISSION_COLUMNS} FROM missions WHERE id = ?"))
            .bind(mission_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mission_from_row).transpose()
    }

    async fn list_missions(&self, owner_id: &str, limit: usize) -> PersistenceResult<Vec<Mission>> {
        let rows = sqlx::query(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions WHERE owner_id = ? \
             ORDER BY start_time DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(to_i64(limit as u64))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mission_from_row).collect()
    }

    async fn increment_counters(
        &self,
        mission_id: &str,
        delta: &MissionCounters,
    ) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            UPDATE missions SET
                found = found + ?,
                new_records = new_records + ?,
                duplicates_skipped = duplicates_skipped + ?,
                processed = processed + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(to_i64(delta.found))
        .bind(to_i64(delta.new_records))
        .bind(to_i64(delta.duplicates_skipped))
        .bind(to_i64(delta.processed))
        .bind(to_ms(Utc::now()))
        .bind(mission_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reconcile_counters(
        &self,
        mission_id: &str,
        observed: &MissionCounters,
    ) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            UPDATE missions SET
                found = MAX(found, ?),
                new_records = MAX(new_records, ?),
                duplicates_skipped = MAX(duplicates_skipped, ?),
                processed = MAX(processed, ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(to_i64(observed.found))
        .bind(to_i64(observed.new_records))
        .bind(to_i64(observed.duplicates_skipped))
        .bind(to_i64(observed.processed))
        .bind(to_ms(Utc::now()))
        .bind(mission_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_mission(
        &self,
        mission_id: &str,
        status: MissionStatus,
        error: Option<&str>,
    ) -> PersistenceResult<bool> {
        let now = to_ms(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE missions SET status = ?, end_time = ?, error = ?, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(error)
        .bind(now)
        .bind(mission_id)
        .execute(&self.pool)
        .await?;

        let transitioned = result.rows_affected() == 1;
        if !transitioned {
            debug!("Mission {mission_id} already terminal, {status} not written");
        }
        Ok(transitioned)
    }

    async fn fail_orphans(&self, reason: &str) -> PersistenceResult<u64> {
        let now = to_ms(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE missions SET status = 'failed', end_time = ?, error = ?, updated_at = ?
            WHERE status = 'running'
            "#,
        )
        .bind(now)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> PersistenceResult<()> {
        let filters = serde_json::to_string(&schedule.filters)?;
        sqlx::query(&format!(
            "INSERT INTO schedules ({SCHEDULE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&schedule.id)
        .bind(&schedule.owner_id)
        .bind(&schedule.keyword)
        .bind(&schedule.cron_expression)
        .bind(schedule.is_active)
        .bind(to_i64(schedule.limits.max_records))
        .bind(to_i64(schedule.limits.daily_quota))
        .bind(filters)
        .bind(schedule.last_run.map(to_ms))
        .bind(schedule.next_run.map(to_ms))
        .bind(to_i64(schedule.total_runs))
        .bind(to_i64(schedule.successful_runs))
        .bind(to_i64(schedule.failed_runs))
        .bind(to_ms(schedule.created_at))
        .bind(to_ms(schedule.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> PersistenceResult<()> {
        let filters = serde_json::to_string(&schedule.filters)?;
        sqlx::query(
            r#"
            UPDATE schedules SET
                cron_expression = ?, is_active = ?, max_records = ?, daily_quota = ?,
                filters = ?, next_run = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&schedule.cron_expression)
        .bind(schedule.is_active)
        .bind(to_i64(schedule.limits.max_records))
        .bind(to_i64(schedule.limits.daily_quota))
        .bind(filters)
        .bind(schedule.next_run.map(to_ms))
        .bind(to_ms(schedule.updated_at))
        .bind(&schedule.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: &str) -> PersistenceResult<Option<Schedule>> {
        let row = sqlx::query(&format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"))
            .bind(schedule_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn find_schedule(
        &self,
        owner_id: &str,
        keyword: &str,
    ) -> PersistenceResult<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE owner_id = ? AND keyword = ?"
        ))
        .bind(owner_id)
        .bind(keyword)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn list_schedules(&self, owner_id: &str) -> PersistenceResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE owner_id = ? ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn list_active_schedules(&self) -> PersistenceResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE is_active = 1 ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn delete_schedule(&self, schedule_id: &str) -> PersistenceResult<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_run(
        &self,
        schedule_id: &str,
        outcome: RunOutcome,
        ran_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> PersistenceResult<()> {
        let (ok, failed) = if outcome.is_success() { (1_i64, 0_i64) } else { (0, 1) };
        sqlx::query(
            r#"
            UPDATE schedules SET
                total_runs = total_runs + 1,
                successful_runs = successful_runs + ?,
                failed_runs = failed_runs + ?,
                last_run = ?,
                next_run = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ok)
        .bind(failed)
        .bind(to_ms(ran_at))
        .bind(next_run.map(to_ms))
        .bind(to_ms(Utc::now()))
        .bind(schedule_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn mission_from_row(row: &SqliteRow) -> PersistenceResult<Mission> {
    let corrupt = |reason: String| PersistenceError::Corrupt {
        table: "missions",
        reason,
    };
    let status: String = row.try_get("status")?;
    let source: String = row.try_get("source")?;
    let filters: String = row.try_get("filters")?;

    Ok(Mission {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        keyword: row.try_get("keyword")?,
        status: MissionStatus::from_str(&status).map_err(corrupt)?,
        start_time: from_ms("missions", row.try_get("start_time")?)?,
        end_time: row
            .try_get::<Option<i64>, _>("end_time")?
            .map(|ms| from_ms("missions", ms))
            .transpose()?,
        counters: MissionCounters {
            found: from_i64(row.try_get("found")?),
            new_records: from_i64(row.try_get("new_records")?),
            duplicates_skipped: from_i64(row.try_get("duplicates_skipped")?),
            processed: from_i64(row.try_get("processed")?),
        },
        limits: MissionLimits::new(
            from_i64(row.try_get("max_records")?),
            from_i64(row.try_get("daily_quota")?),
        ),
        source: MissionSource::from_str(&source).map_err(corrupt)?,
        execution_id: row.try_get("execution_id")?,
        filters: serde_json::from_str::<FilterSet>(&filters)?,
        error: row.try_get("error")?,
        updated_at: from_ms("missions", row.try_get("updated_at")?)?,
    })
}

fn schedule_from_row(row: &SqliteRow) -> PersistenceResult<Schedule> {
    let filters: String = row.try_get("filters")?;
    let optional_ms = |col: &str| -> PersistenceResult<Option<DateTime<Utc>>> {
        row.try_get::<Option<i64>, _>(col)?
            .map(|ms| from_ms("schedules", ms))
            .transpose()
    };

    Ok(Schedule {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        keyword: row.try_get("keyword")?,
        cron_expression: row.try_get("cron_expression")?,
        is_active: row.try_get("is_active")?,
        limits: MissionLimits::new(
            from_i64(row.try_get("max_records")?),
            from_i64(row.try_get("daily_quota")?),
        ),
        filters: serde_json::from_str::<FilterSet>(&filters)?,
        last_run: optional_ms("last_run")?,
        next_run: optional_ms("next_run")?,
        total_runs: from_i64(row.try_get("total_runs")?),
        successful_runs: from_i64(row.try_get("successful_runs")?),
        failed_runs: from_i64(row.try_get("failed_runs")?),
        created_at: from_ms("schedules", row.try_get("created_at")?)?,
        updated_at: from_ms("schedules", row.try_get("updated_at")?)?,
    })
}

fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_ms(table: &'static str, ms: i64) -> PersistenceResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| PersistenceError::Corrupt {
        table,
        reason: format!("timestamp {ms} out of range"),
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_i64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::MissionRequest;

    fn record(advertiser: &str, description: &str) -> ExtractedRecord {
        ExtractedRecord {
            advertiser: advertiser.into(),
            description: description.into(),
            contact: None,
            location: None,
            source: "https://example.com".into(),
            keyword: "shoes".into(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_save_is_ignored_per_owner() {
        let db = SqliteGateway::open_in_memory().await.unwrap();
        let r = record("Loja", "Tênis em promoção");
        assert!(db.save_record(&r, "u1").await.unwrap());
        assert!(!db.save_record(&r, "u1").await.unwrap());
        assert!(db.save_record(&r, "u2").await.unwrap());
        assert_eq!(db.count_today("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn finalize_is_write_once_and_reconcile_takes_max() {
        let db = SqliteGateway::open_in_memory().await.unwrap();
        let mission = Mission::start(&MissionRequest::manual("u1", "shoes", MissionLimits::new(10, 100)));
        db.insert_mission(&mission).await.unwrap();

        let delta = MissionCounters { new_records: 3, processed: 3, ..MissionCounters::default() };
        db.increment_counters(&mission.id, &delta).await.unwrap();
        let summary = MissionCounters { new_records: 1, processed: 5, found: 8, ..MissionCounters::default() };
        db.reconcile_counters(&mission.id, &summary).await.unwrap();

        assert!(db.finalize_mission(&mission.id, MissionStatus::Completed, None).await.unwrap());
        assert!(!db.finalize_mission(&mission.id, MissionStatus::Failed, Some("late")).await.unwrap());

        let stored = db.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Completed);
        assert_eq!(stored.counters.new_records, 3);
        assert_eq!(stored.counters.processed, 5);
        assert_eq!(stored.counters.found, 8);
        assert!(stored.end_time.is_some());
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("missions.db");
        let mission = Mission::start(&MissionRequest::manual("u1", "bolsa", MissionLimits::new(5, 50)));
        {
            let db = SqliteGateway::open(&path).await.unwrap();
            db.insert_mission(&mission).await.unwrap();
            db.close().await;
        }
        let db = SqliteGateway::open(&path).await.unwrap();
        assert_eq!(db.fail_orphans("restart").await.unwrap(), 1);
        let stored = db.get_mission(&mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("restart"));
    }
}
