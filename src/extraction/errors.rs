//! Error types for the extraction engine
//!
//! Only navigation and browser failures are fatal to a worker run. Parse
//! errors are per-record and never leave the batch loop.

/// Error types for extraction operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    /// Navigation failed even after the degraded retry
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A single record could not be read
    #[error("Record parse error: {0}")]
    Parse(String),

    /// The browser or CDP session misbehaved
    #[error("Browser error: {0}")]
    Browser(String),

    /// An in-page script returned something we could not decode
    #[error("Script result decode failed: {0}")]
    Script(String),

    /// A page operation exceeded its timeout
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid engine configuration or invocation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractionError {
    /// Whether this error ends the worker run
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse(_))
    }
}

/// Convenience alias for Result with `ExtractionError`
pub type ExtractionResult<T> = Result<T, ExtractionError>;
