//! Error types for the mission supervisor

use crate::extraction::ExtractionError;
use crate::persistence::PersistenceError;

/// Error types for mission lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Mission not found: {0}")]
    NotFound(String),

    /// Caller does not own the mission. Nothing was mutated.
    #[error("Owner {owner_id} may not access mission {mission_id}")]
    PermissionDenied { mission_id: String, owner_id: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The worker could not be started
    #[error("Failed to launch worker: {0}")]
    Launch(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Convenience alias for Result with `SupervisorError`
pub type SupervisorResult<T> = Result<T, SupervisorError>;
