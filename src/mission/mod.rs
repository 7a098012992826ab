//! Mission lifecycle
//!
//! [`MissionSupervisor`] turns a [`MissionRequest`] into a persisted mission
//! with one running worker, and owns every status transition after that.

pub mod errors;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use errors::{SupervisorError, SupervisorResult};
pub use protocol::ProgressLineDecoder;
pub use registry::{MissionRegistry, RegistryEntry};
pub use supervisor::MissionSupervisor;
pub use types::{
    ActiveMission, Mission, MissionCounters, MissionLimits, MissionRequest, MissionSource,
    MissionStatus,
};
pub use worker::{
    ChromiumDrivers, DriverFactory, InProcessLauncher, ProcessLauncher, WorkerExit, WorkerHandle,
    WorkerLauncher,
};
