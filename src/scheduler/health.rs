//! Health and recovery monitors
//!
//! Both run as interval tasks on children of the scheduler's shutdown token.
//! Neither takes corrective action: they only measure and log.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::cron::CronSchedule;
use super::job_scheduler::JobScheduler;
use super::types::Schedule;

/// One health sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    /// Resident set size in KiB, where the platform exposes it
    pub resident_kb: Option<u64>,
    pub cpus: usize,
    pub armed_jobs: usize,
    pub active_missions: usize,
}

/// `VmRSS` from `/proc/self/status`
#[must_use]
pub fn resident_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// Whether an active schedule missed its expected run by more than `grace`
///
/// The reference point is the last run, or creation for schedules that
/// never ran. An unparseable expression counts as overdue.
#[must_use]
pub fn is_overdue(schedule: &Schedule, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
    if !schedule.is_active {
        return false;
    }
    let reference = schedule.last_run.unwrap_or(schedule.created_at);
    match CronSchedule::parse(&schedule.cron_expression)
        .and_then(|cron| cron.next_after(&reference))
    {
        Ok(expected) => now > expected + grace,
        Err(_) => true,
    }
}

impl JobScheduler {
    /// Take one health sample and log it
    pub async fn health_report(&self) -> HealthReport {
        let report = HealthReport {
            resident_kb: resident_memory_kb(),
            cpus: num_cpus::get(),
            armed_jobs: self.armed_count(),
            active_missions: self.supervisor().registry().len().await,
        };
        info!(
            resident_kb = ?report.resident_kb,
            cpus = report.cpus,
            armed_jobs = report.armed_jobs,
            active_missions = report.active_missions,
            "Scheduler health"
        );
        report
    }

    /// Flag active schedules that have not run within their interval plus grace
    ///
    /// Returns the ids of flagged schedules.
    pub async fn recovery_pass(&self) -> Vec<String> {
        let schedules = match self.inner.store.list_active_schedules().await {
            Ok(schedules) => schedules,
            Err(e) => {
                warn!("Recovery pass could not list schedules: {e}");
                return Vec::new();
            }
        };

        let grace = chrono::Duration::from_std(self.inner.config.recovery_grace())
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let now = Utc::now();

        let mut flagged = Vec::new();
        for schedule in schedules.iter().filter(|s| is_overdue(s, now, grace)) {
            warn!(
                schedule_id = %schedule.id,
                owner_id = %schedule.owner_id,
                last_run = ?schedule.last_run,
                next_run = ?schedule.next_run,
                armed = self.is_armed(&schedule.id),
                "Schedule missed its expected run"
            );
            flagged.push(schedule.id.clone());
        }
        flagged
    }

    /// Spawn the health and recovery interval tasks
    pub fn start_monitors(&self) {
        let health_every = self.inner.config.health_interval();
        let recovery_every = self.inner.config.recovery_interval();

        let scheduler = self.clone();
        let token = self.inner.shutdown.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(health_every);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.health_report().await;
                    }
                }
            }
        });

        let scheduler = self.clone();
        let token = self.inner.shutdown.child_token();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(recovery_every);
            // The first tick fires immediately; skip it so restored jobs get a chance to run
            interval.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.recovery_pass().await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::FilterSet;
    use crate::mission::MissionLimits;
    use chrono::TimeZone;

    fn schedule(cron: &str, last_run: Option<DateTime<Utc>>) -> Schedule {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Schedule {
            id: "s1".into(),
            owner_id: "u1".into(),
            keyword: "shoes".into(),
            cron_expression: cron.into(),
            is_active: true,
            limits: MissionLimits::new(10, 100),
            filters: FilterSet::default(),
            last_run,
            next_run: None,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn reads_vm_rss() {
        let status = "Name:\tmission_scrape\nVmPeak:\t  9000 kB\nVmRSS:\t  4321 kB\n";
        assert_eq!(parse_vm_rss(status), Some(4321));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
    }

    #[test]
    fn overdue_after_interval_plus_grace() {
        let last = Utc.with_ymd_and_hms(2025, 1, 2, 6, 0, 0).unwrap();
        let s = schedule("0 */6 * * *", Some(last));
        let grace = chrono::Duration::minutes(5);

        let on_time = Utc.with_ymd_and_hms(2025, 1, 2, 12, 4, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 2, 12, 6, 0).unwrap();
        assert!(!is_overdue(&s, on_time, grace));
        assert!(is_overdue(&s, late, grace));
    }

    #[test]
    fn never_run_schedules_measure_from_creation() {
        let s = schedule("0 0 * * *", None);
        let grace = chrono::Duration::minutes(5);
        let next_day = Utc.with_ymd_and_hms(2025, 1, 2, 0, 10, 0).unwrap();
        assert!(is_overdue(&s, next_day, grace));

        let mut paused = s.clone();
        paused.is_active = false;
        assert!(!is_overdue(&paused, next_day, grace));
    }
}
