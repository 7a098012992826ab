//! Service-level configuration
//!
//! Loaded once by the binary. Sources are layered in this order:
//! 1. Built-in defaults
//! 2. `config/mission_scrape.{toml,yaml,json}` if present
//! 3. `MISSION_SCRAPE__*` environment variables (`__` separates nesting,
//!    e.g. `MISSION_SCRAPE__SCHEDULER__MAX_ATTEMPTS=5`)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::types::{DiscoveryConfig, ExtractionConfig, FieldConfig};
use crate::extraction::ExtractionResult;
use crate::mission::MissionLimits;

/// How mission workers are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// Engine runs as a tokio task with a typed progress channel
    #[default]
    InProcess,
    /// Engine runs as `mission_scrape worker` speaking the line protocol
    Process,
}

/// Settings owned by the mission supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub default_max_records: u64,
    pub default_daily_quota: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_max_records: 100,
            default_daily_quota: 500,
        }
    }
}

impl SupervisorConfig {
    /// Limits for requests that leave one or both unset
    #[must_use]
    pub fn limits(&self, max_records: Option<u64>, daily_quota: Option<u64>) -> MissionLimits {
        MissionLimits::new(
            max_records.unwrap_or(self.default_max_records),
            daily_quota.unwrap_or(self.default_daily_quota),
        )
    }
}

/// Retry, timeout and monitoring settings for the job scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_factor: f64,
    pub backoff_cap_secs: u64,
    /// Fraction of each delay applied as symmetric random jitter
    pub jitter_ratio: f64,
    pub execution_timeout_secs: u64,
    pub health_interval_secs: u64,
    pub recovery_interval_secs: u64,
    /// Slack added to a schedule's expected interval before it is flagged
    pub recovery_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 30,
            backoff_factor: 2.0,
            backoff_cap_secs: 600,
            jitter_ratio: 0.1,
            execution_timeout_secs: 45 * 60,
            health_interval_secs: 60,
            recovery_interval_secs: 600,
            recovery_grace_secs: 300,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    #[must_use]
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    #[must_use]
    pub fn recovery_grace(&self) -> Duration {
        Duration::from_secs(self.recovery_grace_secs)
    }
}

/// Engine overrides accepted from files and the environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub search_url: Option<String>,
    pub headless: Option<bool>,
    pub batch_size: Option<usize>,
    pub max_scroll_attempts: Option<u32>,
    pub max_execution_secs: Option<u64>,
    pub navigation_timeout_secs: Option<u64>,
    pub discovery: Option<DiscoveryConfig>,
    pub fields: Option<FieldConfig>,
}

/// Top-level configuration for the `mission_scrape` binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite database file, defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    pub worker_mode: WorkerMode,
    /// Executable used for process workers, defaults to the current binary
    pub worker_binary: Option<PathBuf>,
    pub engine: EngineSettings,
    pub supervisor: SupervisorConfig,
    pub scheduler: SchedulerConfig,
}

impl ServiceConfig {
    /// Load configuration from `.env`, the optional config file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed or does not
    /// deserialize into `ServiceConfig`.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/mission_scrape").required(false))
            .add_source(
                config::Environment::with_prefix("MISSION_SCRAPE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        config
            .try_deserialize()
            .context("Failed to deserialize service configuration")
    }

    /// Resolved database path
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("mission_scrape")
                .join("missions.db")
        })
    }

    /// Engine configuration with the overrides applied
    ///
    /// # Errors
    ///
    /// Returns `ExtractionError::Config` if an override fails validation.
    pub fn extraction_config(&self) -> ExtractionResult<ExtractionConfig> {
        let engine = &self.engine;
        let mut builder = ExtractionConfig::builder();
        if let Some(url) = &engine.search_url {
            builder = builder.search_url(url.clone());
        }
        if let Some(headless) = engine.headless {
            builder = builder.headless(headless);
        }
        if let Some(size) = engine.batch_size {
            builder = builder.batch_size(size);
        }
        if let Some(attempts) = engine.max_scroll_attempts {
            builder = builder.max_scroll_attempts(attempts);
        }
        if let Some(secs) = engine.max_execution_secs {
            builder = builder.max_execution_secs(secs);
        }
        if let Some(secs) = engine.navigation_timeout_secs {
            builder = builder.navigation_timeout_secs(secs);
        }
        if let Some(discovery) = &engine.discovery {
            builder = builder.discovery(discovery.clone());
        }
        if let Some(fields) = &engine.fields {
            builder = builder.fields(fields.clone());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_flow_into_extraction_config() {
        let service = ServiceConfig {
            engine: EngineSettings {
                batch_size: Some(7),
                headless: Some(false),
                ..EngineSettings::default()
            },
            ..ServiceConfig::default()
        };
        let config = service.extraction_config().unwrap();
        assert_eq!(config.batch_size(), 7);
        assert!(!config.headless());
    }

    #[test]
    fn explicit_database_path_wins() {
        let service = ServiceConfig {
            database_path: Some(PathBuf::from("/tmp/x.db")),
            ..ServiceConfig::default()
        };
        assert_eq!(service.database_path(), PathBuf::from("/tmp/x.db"));
        assert!(ServiceConfig::default().database_path().ends_with("missions.db"));
    }

    #[test]
    fn worker_mode_deserializes_snake_case() {
        let mode: WorkerMode = serde_json::from_str("\"process\"").unwrap();
        assert_eq!(mode, WorkerMode::Process);
    }
}
