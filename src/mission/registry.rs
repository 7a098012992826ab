//! Live registry of running mission workers
//!
//! Owned by one `MissionSupervisor`. Holds the cancellation handle, the live
//! counters and a status subscription for every mission that still has a
//! worker attached.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use super::types::{ActiveMission, MissionCounters, MissionStatus};

/// Initial capacity for the registry map
const REGISTRY_INITIAL_CAPACITY: usize = 16;

/// One running worker
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub owner_id: String,
    pub keyword: String,
    pub counters: MissionCounters,
    pub started_at: DateTime<Utc>,
    pub(crate) cancel: CancellationToken,
    pub(crate) status: watch::Receiver<MissionStatus>,
}

impl RegistryEntry {
    pub(crate) fn new(
        owner_id: String,
        keyword: String,
        started_at: DateTime<Utc>,
        cancel: CancellationToken,
        status: watch::Receiver<MissionStatus>,
    ) -> Self {
        Self {
            owner_id,
            keyword,
            counters: MissionCounters::default(),
            started_at,
            cancel,
            status,
        }
    }

    /// Signal the worker to terminate
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

/// Registry of active workers keyed by mission id
#[derive(Clone)]
pub struct MissionRegistry {
    entries: Arc<Mutex<HashMap<String, RegistryEntry>>>,
}

impl MissionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::with_capacity(
                REGISTRY_INITIAL_CAPACITY,
            ))),
        }
    }

    /// Register a worker. Returns false if the mission already has one.
    pub async fn register(&self, mission_id: &str, entry: RegistryEntry) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(mission_id) {
            log::warn!("Mission {mission_id} already has an active worker");
            return false;
        }
        entries.insert(mission_id.to_string(), entry);
        true
    }

    /// Add a counter delta to the live entry, if any
    pub async fn apply(&self, mission_id: &str, delta: &MissionCounters) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(mission_id) {
            entry.counters.add(delta);
        }
    }

    pub async fn get(&self, mission_id: &str) -> Option<RegistryEntry> {
        self.entries.lock().await.get(mission_id).cloned()
    }

    pub async fn remove(&self, mission_id: &str) -> Option<RegistryEntry> {
        let removed = self.entries.lock().await.remove(mission_id);
        if removed.is_some() {
            log::debug!("Removed mission {mission_id} from registry");
        }
        removed
    }

    /// Remove every entry, returning them with their mission ids
    pub async fn drain(&self) -> Vec<(String, RegistryEntry)> {
        self.entries.lock().await.drain().collect()
    }

    /// Status subscription for a registered mission
    pub async fn subscribe(&self, mission_id: &str) -> Option<watch::Receiver<MissionStatus>> {
        self.entries
            .lock()
            .await
            .get(mission_id)
            .map(|entry| entry.status.clone())
    }

    /// Live view of one owner's running missions, oldest first
    pub async fn active_for(&self, owner_id: &str) -> Vec<ActiveMission> {
        let entries = self.entries.lock().await;
        let mut active: Vec<ActiveMission> = entries
            .iter()
            .filter(|(_, entry)| entry.owner_id == owner_id)
            .map(|(id, entry)| ActiveMission {
                mission_id: id.clone(),
                keyword: entry.keyword.clone(),
                counters: entry.counters,
                started_at: entry.started_at,
            })
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(owner: &str, keyword: &str) -> (RegistryEntry, watch::Sender<MissionStatus>) {
        let (tx, rx) = watch::channel(MissionStatus::Running);
        (
            RegistryEntry::new(
                owner.to_string(),
                keyword.to_string(),
                Utc::now(),
                CancellationToken::new(),
                rx,
            ),
            tx,
        )
    }

    #[tokio::test]
    async fn one_worker_per_mission() {
        let registry = MissionRegistry::new();
        let (first, _tx1) = entry("u1", "shoes");
        let (second, _tx2) = entry("u1", "shoes");
        assert!(registry.register("m1", first).await);
        assert!(!registry.register("m1", second).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn active_view_is_owner_scoped() {
        let registry = MissionRegistry::new();
        let (a, _ta) = entry("u1", "shoes");
        let (b, _tb) = entry("u2", "hats");
        registry.register("m1", a).await;
        registry.register("m2", b).await;
        registry
            .apply("m1", &MissionCounters { new_records: 2, processed: 2, ..Default::default() })
            .await;

        let active = registry.active_for("u1").await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].mission_id, "m1");
        assert_eq!(active[0].counters.new_records, 2);
    }

    #[tokio::test]
    async fn remove_returns_cancellable_entry() {
        let registry = MissionRegistry::new();
        let (a, _ta) = entry("u1", "shoes");
        let token = a.cancel.clone();
        registry.register("m1", a).await;
        let removed = registry.remove("m1").await.unwrap();
        removed.terminate();
        assert!(token.is_cancelled());
        assert!(registry.is_empty().await);
    }
}
