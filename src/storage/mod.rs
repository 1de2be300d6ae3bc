//! Storage backends for observation persistence
//!
//! ## Design
//!
//! - **Trait-based**: `MetricsStore` allows swapping implementations
//! - **Async**: All operations are async and safe to call from many probe tasks at once
//! - **Append-only**: The scan pipeline only inserts; deletion is a retention concern
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, also hosts the server registry
//! - **In-Memory**: No persistence, for testing or `"backend": "none"`

pub mod backend;
pub mod error;
pub mod memory;
pub mod retention;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, MetricsStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use retention::RetentionTask;
pub use schema::Observation;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteBackend;
