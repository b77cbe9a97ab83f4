//! In-memory history backend (no persistence)
//!
//! Keeps the most recent transitions in a bounded ring buffer. Used when no
//! database is configured and throughout the tests.

use std::collections::VecDeque;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::EntityId;

use super::backend::{HealthStatus, HistoryBackend, QueryRange};
use super::error::StorageResult;
use super::schema::TransitionEvent;

/// Maximum events kept in memory (across all rooms)
const MAX_EVENTS: usize = 10_000;

/// In-memory history backend
///
/// When the buffer is full, the oldest events are evicted.
pub struct MemoryBackend {
    events: RwLock<VecDeque<TransitionEvent>>,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(MAX_EVENTS))),
            capacity: capacity.max(1),
        }
    }

    /// Total events currently held
    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, filter: impl Fn(&TransitionEvent) -> bool) -> Vec<TransitionEvent> {
        self.events
            .read()
            .map(|events| events.iter().filter(|e| filter(e)).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryBackend for MemoryBackend {
    async fn append(&self, event: TransitionEvent) -> StorageResult<()> {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());

        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);

        Ok(())
    }

    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<TransitionEvent>> {
        debug!("querying in-memory history for {}", query.entity_id);

        let mut events = self.matching(|e| {
            e.entity_id == query.entity_id && e.timestamp >= query.start && e.timestamp <= query.end
        });
        events.sort_by_key(|e| e.timestamp);
        events.truncate(query.limit.unwrap_or(usize::MAX));

        Ok(events)
    }

    async fn query_latest(
        &self,
        entity_id: EntityId,
        limit: usize,
    ) -> StorageResult<Vec<TransitionEvent>> {
        debug!("querying latest {limit} transitions for {entity_id}");

        let mut events = self.matching(|e| e.entity_id == entity_id);
        events.sort_by_key(|e| e.timestamp);
        let skip = events.len().saturating_sub(limit);

        Ok(events.split_off(skip))
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        let len_before = events.len();
        events.retain(|e| e.timestamp >= before);

        Ok(len_before - events.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            backend: "memory",
            detail: format!("{} of {} events held", self.len(), self.capacity),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
