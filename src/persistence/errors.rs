//! Error types for the persistence layer

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to prepare storage: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be mapped back to a domain type
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// The backend is unreachable (used by test doubles and on shutdown)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias for Result with `PersistenceError`
pub type PersistenceResult<T> = Result<T, PersistenceError>;
