//! Collaborator interfaces for subscriptions, destinations and transport sessions
//!
//! The poller never owns this data. It asks through the traits below on every
//! tick, so changes made by the surrounding bot show up on the next poll.
//! [`Directory`] is an in-memory implementation seeded from the config file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::notify::TransportSession;
use crate::{DestinationId, EntityId};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Every room with at least one subscriber
    async fn subscribed_entities(&self) -> anyhow::Result<Vec<EntityId>>;

    async fn destinations_for(&self, entity: EntityId) -> anyhow::Result<Vec<DestinationId>>;

    /// Store the refreshed owner name of a room
    async fn set_host_name(&self, entity: EntityId, host_name: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait DestinationRegistry: Send + Sync {
    /// Destinations that accept live notices
    async fn notice_destinations(&self) -> anyhow::Result<Vec<DestinationId>>;
}

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn active_sessions(&self) -> Vec<Arc<dyn TransportSession>>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    subscriptions: BTreeMap<EntityId, BTreeSet<DestinationId>>,
    host_names: HashMap<EntityId, String>,
    notice: HashMap<DestinationId, bool>,
}

/// In-memory subscription store and destination registry
#[derive(Debug, Default)]
pub struct Directory {
    state: RwLock<DirectoryState>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let directory = Self::new();

        for subscription in &config.subscriptions {
            for &destination in &subscription.destinations {
                directory.subscribe(subscription.entity, destination);
            }
            if let Some(host_name) = &subscription.host_name {
                directory.write().host_names.insert(subscription.entity, host_name.clone());
            }
        }

        for destination in &config.destinations {
            directory.set_notice(destination.id, destination.notice);
        }

        debug!(
            "directory seeded with {} rooms and {} destinations",
            directory.read().subscriptions.len(),
            config.destinations.len()
        );

        directory
    }

    pub fn subscribe(&self, entity: EntityId, destination: DestinationId) {
        self.write()
            .subscriptions
            .entry(entity)
            .or_default()
            .insert(destination);
    }

    /// Remove one subscription; the room is forgotten once nobody subscribes
    pub fn unsubscribe(&self, entity: EntityId, destination: DestinationId) {
        let mut state = self.write();
        let Some(destinations) = state.subscriptions.get_mut(&entity) else {
            return;
        };

        destinations.remove(&destination);
        if destinations.is_empty() {
            state.subscriptions.remove(&entity);
            state.host_names.remove(&entity);
        }
    }

    pub fn set_notice(&self, destination: DestinationId, enabled: bool) {
        self.write().notice.insert(destination, enabled);
    }

    pub fn host_name(&self, entity: EntityId) -> Option<String> {
        self.read().host_names.get(&entity).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SubscriptionStore for Directory {
    async fn subscribed_entities(&self) -> anyhow::Result<Vec<EntityId>> {
        Ok(self.read().subscriptions.keys().copied().collect())
    }

    async fn destinations_for(&self, entity: EntityId) -> anyhow::Result<Vec<DestinationId>> {
        Ok(self
            .read()
            .subscriptions
            .get(&entity)
            .map(|destinations| destinations.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn set_host_name(&self, entity: EntityId, host_name: &str) -> anyhow::Result<()> {
        let mut state = self.write();
        if !state.subscriptions.contains_key(&entity) {
            anyhow::bail!("room {entity} has no subscribers");
        }
        state.host_names.insert(entity, host_name.to_string());
        Ok(())
    }
}

#[async_trait]
impl DestinationRegistry for Directory {
    async fn notice_destinations(&self) -> anyhow::Result<Vec<DestinationId>> {
        Ok(self
            .read()
            .notice
            .iter()
            .filter_map(|(&destination, &enabled)| enabled.then_some(destination))
            .collect())
    }
}

/// Fixed set of sessions built at startup
#[derive(Clone, Default)]
pub struct StaticSessions {
    sessions: Vec<Arc<dyn TransportSession>>,
}

impl StaticSessions {
    pub fn new(sessions: Vec<Arc<dyn TransportSession>>) -> Self {
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionRegistry for StaticSessions {
    async fn active_sessions(&self) -> Vec<Arc<dyn TransportSession>> {
        self.sessions.clone()
    }
}
