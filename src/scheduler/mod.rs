//! Recurring missions
//!
//! [`JobScheduler`] keeps cron-triggered [`Schedule`]s armed, runs each tick
//! through the mission supervisor with retry and timeout, and watches its
//! own health.

pub mod backoff;
pub mod cron;
pub mod errors;
pub mod health;
pub mod job_scheduler;
pub mod types;

pub use backoff::Backoff;
pub use cron::{CronError, CronSchedule};
pub use errors::{SchedulerError, SchedulerResult};
pub use health::{HealthReport, is_overdue, resident_memory_kb};
pub use job_scheduler::JobScheduler;
pub use types::{RunOutcome, Schedule};
