//! Persistence boundary
//!
//! `PersistenceGateway` is the only way the rest of the crate touches
//! storage. Two implementations ship: SQLite for the service and an
//! in-memory store for one-off runs and tests.

pub mod errors;
pub mod gateway;
pub mod memory;
pub mod sqlite;

pub use errors::{PersistenceError, PersistenceResult};
pub use gateway::PersistenceGateway;
pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;
