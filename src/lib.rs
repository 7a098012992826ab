pub mod browser_setup;
pub mod config;
pub mod extraction;
pub mod mission;
pub mod persistence;
pub mod scheduler;
pub mod utils;

pub use browser_setup::{BrowserSession, download_managed_browser, find_browser_executable, launch_browser};
pub use config::{ExtractionConfig, ServiceConfig, WorkerMode};
pub use extraction::{
    ExtractedRecord, ExtractionEngine, ExtractionError, FilterSet, MissionSummary, PageDriver,
    ProgressEvent, ProgressReporter, WorkerInvocation,
};
pub use mission::{
    InProcessLauncher, Mission, MissionLimits, MissionRequest, MissionStatus, MissionSupervisor,
    ProcessLauncher, SupervisorError, WorkerLauncher,
};
pub use persistence::{MemoryGateway, PersistenceError, PersistenceGateway, SqliteGateway};
pub use scheduler::{JobScheduler, RunOutcome, Schedule, SchedulerError};
