//! History storage backends
//!
//! Transition events are persisted through the `HistoryBackend` trait so the
//! history actor does not care where they end up.
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database file
//! - **In-Memory**: bounded ring buffer, no persistence (tests, `backend: none`)

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, HistoryBackend, QueryRange};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{TransitionEvent, TransitionKind};
