//! Error types for the job scheduler

use super::cron::CronError;
use crate::mission::SupervisorError;
use crate::persistence::PersistenceError;

/// Error types for scheduling operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Rejected at creation time, nothing was stored
    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] CronError),

    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Owner {owner_id} may not access schedule {schedule_id}")]
    PermissionDenied {
        schedule_id: String,
        owner_id: String,
    },

    /// The mission outlived the scheduler's execution timeout and was failed
    #[error("Mission {mission_id} exceeded the {timeout_secs}s execution timeout")]
    Timeout { mission_id: String, timeout_secs: u64 },

    /// One execution attempt failed
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Convenience alias for Result with `SchedulerError`
pub type SchedulerResult<T> = Result<T, SchedulerError>;
