//! State cache - last observed state of every monitored room
//!
//! The cache is the only memory of "what did we see last time". It is an
//! explicitly owned object (shared via `Arc`), so tests build isolated instances.
//!
//! ## Concurrency
//!
//! The map lock is only held for single map operations and never across an
//! await point. Within one tick every room is written by exactly one task,
//! so there is no contention on a single slot.

use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::source::{LiveSource, SourceError};
use crate::{EntityId, EntityState};

/// Summary of a bulk bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub initialized: Vec<EntityId>,
    pub failed: Vec<(EntityId, SourceError)>,
}

#[derive(Debug, Default)]
pub struct StateCache {
    slots: RwLock<HashMap<EntityId, EntityState>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity: EntityId) -> Option<EntityState> {
        self.read().get(&entity).cloned()
    }

    /// Replace the whole state of a room
    pub fn set(&self, entity: EntityId, state: EntityState) {
        self.write().insert(entity, state);
    }

    pub fn remove(&self, entity: EntityId) -> Option<EntityState> {
        self.write().remove(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.read().contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Change some fields of a cached room in place; false when it is not cached
    ///
    /// Fields the closure leaves alone keep whatever another writer stored
    /// since the caller last read the room.
    pub fn update(&self, entity: EntityId, change: impl FnOnce(&mut EntityState)) -> bool {
        match self.write().get_mut(&entity) {
            Some(state) => {
                change(state);
                true
            }
            None => false,
        }
    }

    /// Refresh only the host name; returns false when the room is not cached
    pub fn update_host_name(&self, entity: EntityId, host_name: String) -> bool {
        self.update(entity, |state| state.host_name = host_name)
    }

    /// Bootstrap a single room: one status fetch plus the owner name
    #[instrument(skip(self, source), fields(entity = %entity))]
    pub async fn initialize(
        &self,
        source: &dyn LiveSource,
        entity: EntityId,
    ) -> Result<EntityState, SourceError> {
        let snapshot = source.fetch_status(entity).await.inspect_err(|e| {
            error!("failed to fetch room info during initialization: {e}");
        })?;

        let host_name = source
            .fetch_host_name(snapshot.host_id)
            .await
            .inspect_err(|e| {
                error!(
                    "failed to fetch host {} during initialization: {e}",
                    snapshot.host_id
                );
            })?;

        let state = EntityState {
            status: snapshot.status,
            title: snapshot.title,
            host_name,
        };

        info!(
            "initialized room {entity}/{} with status {}",
            state.host_name, state.status
        );

        self.set(entity, state.clone());

        Ok(state)
    }

    /// Bootstrap all rooms concurrently; failures are logged, never fatal
    #[instrument(skip_all, fields(count = entities.len()))]
    pub async fn init_all(&self, source: &dyn LiveSource, entities: &[EntityId]) -> InitReport {
        debug!("initializing state cache");

        let results = join_all(
            entities
                .iter()
                .map(|&entity| async move { (entity, self.initialize(source, entity).await) }),
        )
        .await;

        let mut report = InitReport::default();
        for (entity, result) in results {
            match result {
                Ok(_) => report.initialized.push(entity),
                Err(e) => report.failed.push((entity, e)),
            }
        }

        if report.failed.is_empty() {
            info!("state cache initialized ({} rooms)", report.initialized.len());
        } else {
            warn!(
                "state cache initialized with failures ({} ok, {} failed)",
                report.initialized.len(),
                report.failed.len()
            );
        }

        report
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityId, EntityState>> {
        // inserts are atomic, so a poisoned map is still consistent
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityId, EntityState>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }
}
