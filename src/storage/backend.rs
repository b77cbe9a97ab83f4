//! The `HistoryBackend` seam between the history actor and a store

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::EntityId;

use super::error::StorageResult;
use super::schema::TransitionEvent;

/// Transitions of one room inside `[start, end]`
#[derive(Debug, Clone)]
pub struct QueryRange {
    pub entity_id: EntityId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub healthy: bool,

    /// Short backend name, e.g. `sqlite`
    pub backend: &'static str,

    pub detail: String,
}

/// Append-only store of transition events
///
/// Backends are owned by the history actor and called from its task only.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn append(&self, event: TransitionEvent) -> StorageResult<()>;

    /// Oldest first
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<TransitionEvent>>;

    /// The `limit` most recent transitions of a room, oldest first
    async fn query_latest(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<TransitionEvent>>;

    /// Delete everything recorded before `before`; returns the number of rows removed
    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    async fn close(&self) -> StorageResult<()>;
}
