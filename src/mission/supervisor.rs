//! Mission supervisor
//!
//! Owns the lifecycle of every mission: persists the record, launches a
//! worker, folds its progress into the store and the live registry, and
//! writes the terminal status exactly once.

use std::sync::Arc;

use tokio::sync::{mpsc::UnboundedReceiver, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::errors::{SupervisorError, SupervisorResult};
use super::registry::{MissionRegistry, RegistryEntry};
use super::types::{ActiveMission, Mission, MissionCounters, MissionRequest, MissionStatus};
use super::worker::{WorkerExit, WorkerLauncher};
use crate::config::SupervisorConfig;
use crate::extraction::{MissionSummary, ProgressEvent, WorkerInvocation};
use crate::persistence::PersistenceGateway;

const ORPHAN_REASON: &str = "worker lost: process restarted while mission was running";

/// Supervises mission workers
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct MissionSupervisor {
    store: Arc<dyn PersistenceGateway>,
    launcher: Arc<dyn WorkerLauncher>,
    registry: MissionRegistry,
    config: SupervisorConfig,
}

impl MissionSupervisor {
    #[must_use]
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        launcher: Arc<dyn WorkerLauncher>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            launcher,
            registry: MissionRegistry::new(),
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &MissionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
        &self.store
    }

    /// Persist a running mission and start its worker
    ///
    /// A zero `max_records` falls back to the configured default.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Persistence` if the mission cannot be stored
    /// and `SupervisorError::Launch` if the worker does not start. In the
    /// latter case the mission is already finalized as failed.
    pub async fn create(&self, mut request: MissionRequest) -> SupervisorResult<Mission> {
        if request.limits.max_records == 0 {
            request.limits.max_records = self.config.default_max_records;
        }

        let mission = Mission::start(&request);
        self.store.insert_mission(&mission).await?;
        info!(
            mission_id = %mission.id,
            owner_id = %mission.owner_id,
            keyword = %mission.keyword,
            source = mission.source.as_str(),
            "Mission created"
        );

        let invocation = WorkerInvocation {
            mission_id: mission.id.clone(),
            owner_id: mission.owner_id.clone(),
            keyword: mission.keyword.clone(),
            max_records: mission.limits.max_records,
            daily_quota: mission.limits.daily_quota,
            filters: mission.filters.clone(),
            resume_cutoff: request.resume_cutoff,
        };

        let handle = match self.launcher.launch(invocation).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(mission_id = %mission.id, "Worker launch failed: {e}");
                let reason = e.to_string();
                if let Err(store_err) = self
                    .store
                    .finalize_mission(&mission.id, MissionStatus::Failed, Some(&reason))
                    .await
                {
                    warn!(mission_id = %mission.id, "Failed to record launch failure: {store_err}");
                }
                return Err(e);
            }
        };

        let (status_tx, status_rx) = watch::channel(MissionStatus::Running);
        let entry = RegistryEntry::new(
            mission.owner_id.clone(),
            mission.keyword.clone(),
            mission.start_time,
            handle.cancel.clone(),
            status_rx,
        );
        if !self.registry.register(&mission.id, entry).await {
            handle.cancel.cancel();
            return Err(SupervisorError::Launch(format!(
                "mission {} already has a worker",
                mission.id
            )));
        }

        tokio::spawn(monitor(
            Arc::clone(&self.store),
            self.registry.clone(),
            mission.id.clone(),
            handle.events,
            handle.exit,
            status_tx,
        ));

        Ok(mission)
    }

    /// Stop a running mission on behalf of its owner
    ///
    /// Returns true if this call stopped the mission, false if it had
    /// already reached a terminal status.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `PermissionDenied` if `owner_id` does not
    /// own the mission.
    pub async fn stop(&self, mission_id: &str, owner_id: &str) -> SupervisorResult<bool> {
        let mission = self.owned_mission(mission_id, owner_id).await?;
        if mission.status.is_terminal() {
            debug!(mission_id, status = %mission.status, "Stop ignored, mission already terminal");
            return Ok(false);
        }

        let transitioned = self
            .terminate(mission_id, MissionStatus::Stopped, None)
            .await?;
        info!(mission_id, owner_id, "Mission stopped");
        Ok(transitioned)
    }

    /// Fail a mission and terminate its worker, without an ownership check
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Persistence` if the status cannot be written.
    pub async fn force_fail(&self, mission_id: &str, reason: &str) -> SupervisorResult<bool> {
        let transitioned = self
            .terminate(mission_id, MissionStatus::Failed, Some(reason))
            .await?;
        warn!(mission_id, reason, "Mission force-failed");
        Ok(transitioned)
    }

    /// Write the terminal status, then signal the worker
    async fn terminate(
        &self,
        mission_id: &str,
        status: MissionStatus,
        reason: Option<&str>,
    ) -> SupervisorResult<bool> {
        let transitioned = self
            .store
            .finalize_mission(mission_id, status, reason)
            .await?;
        if let Some(entry) = self.registry.remove(mission_id).await {
            entry.terminate();
        }
        Ok(transitioned)
    }

    /// Live counters of the owner's running missions
    pub async fn status(&self, owner_id: &str) -> Vec<ActiveMission> {
        self.registry.active_for(owner_id).await
    }

    /// Wait until the mission reaches a terminal status
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn wait(&self, mission_id: &str) -> SupervisorResult<MissionStatus> {
        if let Some(mut rx) = self.registry.subscribe(mission_id).await {
            loop {
                let status = *rx.borrow_and_update();
                if status.is_terminal() {
                    return Ok(status);
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let mission = self
            .store
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(mission_id.to_string()))?;
        Ok(mission.status)
    }

    /// Owner-scoped read of one mission
    ///
    /// # Errors
    ///
    /// `NotFound` or `PermissionDenied`.
    pub async fn get(&self, mission_id: &str, owner_id: &str) -> SupervisorResult<Mission> {
        self.owned_mission(mission_id, owner_id).await
    }

    /// Most recent missions of an owner
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Persistence` on store failure.
    pub async fn history(&self, owner_id: &str, limit: usize) -> SupervisorResult<Vec<Mission>> {
        Ok(self.store.list_missions(owner_id, limit).await?)
    }

    /// Fail missions left running by a previous process
    ///
    /// Call once at startup, before any mission is created.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Persistence` on store failure.
    pub async fn recover_orphans(&self) -> SupervisorResult<u64> {
        let recovered = self.store.fail_orphans(ORPHAN_REASON).await?;
        if recovered > 0 {
            warn!(recovered, "Marked orphaned missions as failed");
        }
        Ok(recovered)
    }

    /// Stop every active worker and wait for their monitors to finish
    pub async fn shutdown(&self) {
        let entries = self.registry.drain().await;
        if entries.is_empty() {
            return;
        }
        info!(active = entries.len(), "Stopping active missions");

        for (mission_id, entry) in &entries {
            if let Err(e) = self
                .store
                .finalize_mission(mission_id, MissionStatus::Stopped, None)
                .await
            {
                warn!(mission_id = %mission_id, "Failed to record stop during shutdown: {e}");
            }
            entry.terminate();
        }

        for (_, entry) in entries {
            let mut rx = entry.status;
            while rx.changed().await.is_ok() {}
        }
    }

    async fn owned_mission(&self, mission_id: &str, owner_id: &str) -> SupervisorResult<Mission> {
        let mission = self
            .store
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| SupervisorError::NotFound(mission_id.to_string()))?;
        if mission.owner_id != owner_id {
            return Err(SupervisorError::PermissionDenied {
                mission_id: mission_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        Ok(mission)
    }
}

/// Consume one worker's progress, then finalize its mission
async fn monitor(
    store: Arc<dyn PersistenceGateway>,
    registry: MissionRegistry,
    mission_id: String,
    mut events: UnboundedReceiver<ProgressEvent>,
    exit: JoinHandle<WorkerExit>,
    status_tx: watch::Sender<MissionStatus>,
) {
    let mut incremental = MissionCounters::default();
    let mut summary: Option<MissionSummary> = None;

    while let Some(event) = events.recv().await {
        if let ProgressEvent::Summary(s) = event {
            summary.get_or_insert(s);
            continue;
        }
        let Some(delta) = MissionCounters::delta_for(&event) else {
            continue;
        };
        incremental.add(&delta);
        registry.apply(&mission_id, &delta).await;
        if let Err(e) = store.increment_counters(&mission_id, &delta).await {
            warn!(mission_id = %mission_id, "Failed to persist progress: {e}");
        }
    }

    let exit = match exit.await {
        Ok(exit) => exit,
        Err(join) if join.is_cancelled() => WorkerExit::Killed,
        Err(join) => WorkerExit::Error(format!("worker panicked: {join}")),
    };

    let observed = summary
        .as_ref()
        .map(MissionCounters::from)
        .unwrap_or_default();
    let reconciled = incremental.max_with(&observed);
    if let Err(e) = store.reconcile_counters(&mission_id, &reconciled).await {
        warn!(mission_id = %mission_id, "Failed to reconcile counters: {e}");
    }

    let status = exit.status();
    let final_status = match store
        .finalize_mission(&mission_id, status, exit.error())
        .await
    {
        Ok(true) => status,
        Ok(false) => match store.get_mission(&mission_id).await {
            Ok(Some(mission)) => mission.status,
            _ => status,
        },
        Err(e) => {
            error!(mission_id = %mission_id, "Failed to finalize mission: {e}");
            status
        }
    };

    registry.remove(&mission_id).await;
    info!(
        mission_id = %mission_id,
        status = %final_status,
        found = reconciled.found,
        saved = reconciled.new_records,
        duplicates = reconciled.duplicates_skipped,
        "Mission finished"
    );
    let _ = status_tx.send(final_status);
}
