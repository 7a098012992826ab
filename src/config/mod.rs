//! Configuration for extraction runs and the mission service
//!
//! `ExtractionConfig` and its builder cover one engine run. `ServiceConfig`
//! covers the long-running service: storage, worker mode, supervisor and
//! scheduler settings.

use once_cell::sync::Lazy;
use regex::Regex;

// Sub-modules
pub mod builder;
pub mod getters;
pub mod service;
pub mod types;

// Re-exports for public API
pub use builder::ExtractionConfigBuilder;
pub use service::{EngineSettings, SchedulerConfig, ServiceConfig, SupervisorConfig, WorkerMode};
pub use types::{DiscoveryConfig, ExtractionConfig, FieldConfig};

static DEFAULT_PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(crate::utils::DEFAULT_PHONE_PATTERN).expect("Invalid default phone regex")
});

pub(crate) fn default_phone_regex() -> &'static Regex {
    &DEFAULT_PHONE_REGEX
}
