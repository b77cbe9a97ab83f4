//! Helper types for integration tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use livewatch::actors::history::HistoryHandle;
use livewatch::cache::StateCache;
use livewatch::directory::{Directory, StaticSessions};
use livewatch::engine::PollEngine;
use livewatch::notify::{
    CoverFetcher, DeliveryError, NotificationFanout, NotificationMessage, Renderer,
    TransportSession,
};
use livewatch::source::{Identity, LiveSource, SourceError};
use livewatch::{DestinationId, EntityId, EntityState, LiveStatus, RoomSnapshot};

pub const COVER_BYTES: &[u8] = b"\xFF\xD8\xFFcover";

#[derive(Debug, Clone)]
struct ScriptedRoom {
    status: LiveStatus,
    title: String,
    failure: Option<SourceError>,
    panics: bool,
    delay: Option<Duration>,
}

/// Upstream whose answers are set by the test
#[derive(Default)]
pub struct ScriptedSource {
    rooms: Mutex<HashMap<EntityId, ScriptedRoom>>,
    host_names: Mutex<HashMap<u64, Result<String, SourceError>>>,
    status_calls: Mutex<HashMap<EntityId, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn set_room(&self, entity: u64, status: LiveStatus, title: &str) {
        self.rooms.lock().unwrap().insert(
            EntityId(entity),
            ScriptedRoom {
                status,
                title: title.to_string(),
                failure: None,
                panics: false,
                delay: None,
            },
        );
    }

    pub fn fail(&self, entity: u64, error: SourceError) {
        self.update(entity, |room| room.failure = Some(error));
    }

    pub fn panic_on(&self, entity: u64) {
        self.update(entity, |room| room.panics = true);
    }

    pub fn delay(&self, entity: u64, delay: Duration) {
        self.update(entity, |room| room.delay = Some(delay));
    }

    pub fn set_host_name(&self, host_id: u64, result: Result<String, SourceError>) {
        self.host_names.lock().unwrap().insert(host_id, result);
    }

    /// Number of status fetches made for a room
    pub fn fetch_count(&self, entity: u64) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(&EntityId(entity))
            .copied()
            .unwrap_or(0)
    }

    /// Most status fetches that were ever running at the same time
    pub fn peak_concurrent_fetches(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn update(&self, entity: u64, change: impl FnOnce(&mut ScriptedRoom)) {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms
            .get_mut(&EntityId(entity))
            .expect("room must be scripted first");
        change(room);
    }
}

#[async_trait]
impl LiveSource for ScriptedSource {
    async fn fetch_status(&self, entity: EntityId) -> Result<RoomSnapshot, SourceError> {
        *self.status_calls.lock().unwrap().entry(entity).or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.scripted_status(entity).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_host_name(&self, host_id: u64) -> Result<String, SourceError> {
        self.host_names
            .lock()
            .unwrap()
            .get(&host_id)
            .cloned()
            .unwrap_or_else(|| Ok(format!("host-{host_id}")))
    }

    async fn verify_credential(&self) -> Result<Identity, SourceError> {
        Ok(Identity {
            uid: 1,
            name: "tester".to_string(),
        })
    }
}

impl ScriptedSource {
    async fn scripted_status(&self, entity: EntityId) -> Result<RoomSnapshot, SourceError> {
        let room = self.rooms.lock().unwrap().get(&entity).cloned();
        let Some(room) = room else {
            return Err(SourceError::NotFound(format!("room {entity}")));
        };

        if let Some(delay) = room.delay {
            tokio::time::sleep(delay).await;
        }
        if room.panics {
            panic!("scripted panic for room {entity}");
        }
        if let Some(error) = room.failure {
            return Err(error);
        }

        Ok(RoomSnapshot {
            entity_id: entity,
            status: room.status,
            title: room.title,
            cover_url: Some(format!("https://covers.test/{entity}.jpg")),
            host_id: entity.0,
            live_since: Some("2026-10-18 20:00:00".to_string()),
            observed_at: Utc::now(),
        })
    }
}

/// Transport that records what it was asked to send
pub struct RecordingSession {
    name: String,
    failing: HashSet<DestinationId>,
    delay: Option<Duration>,
    sent: Mutex<Vec<(DestinationId, NotificationMessage)>>,
}

impl RecordingSession {
    pub fn new(name: &str, failing: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failing: failing.iter().copied().map(DestinationId).collect(),
            delay: None,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Every send takes `delay` before it is accepted
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failing: HashSet::new(),
            delay: Some(delay),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(DestinationId, NotificationMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportSession for RecordingSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        destination: DestinationId,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&destination) {
            return Err(DeliveryError::Rejected(format!(
                "{destination} refused the message"
            )));
        }
        self.sent.lock().unwrap().push((destination, message.clone()));
        Ok(())
    }
}

/// Cover fetcher with a fixed answer
pub struct StaticCover {
    available: bool,
}

impl StaticCover {
    pub fn available() -> Arc<Self> {
        Arc::new(Self { available: true })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self { available: false })
    }
}

#[async_trait]
impl CoverFetcher for StaticCover {
    async fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
        if self.available {
            Ok(COVER_BYTES.to_vec())
        } else {
            anyhow::bail!("cover host unreachable")
        }
    }
}

/// Destinations every room in a rig is subscribed to
pub const DESTINATIONS: [i64; 2] = [100, 200];

/// Engine wired to scripted collaborators
pub struct TestRig {
    pub source: Arc<ScriptedSource>,
    pub directory: Arc<Directory>,
    pub session: Arc<RecordingSession>,
    pub cache: Arc<StateCache>,
    pub history: HistoryHandle,
    pub engine: PollEngine,
}

impl TestRig {
    pub fn new(entities: &[u64]) -> Self {
        Self::build(
            entities,
            RecordingSession::new("recorder", &[]),
            StaticCover::available(),
            HistoryHandle::spawn_in_memory(),
        )
    }

    pub fn with_failing_destinations(entities: &[u64], failing: &[i64]) -> Self {
        Self::build(
            entities,
            RecordingSession::new("recorder", failing),
            StaticCover::available(),
            HistoryHandle::spawn_in_memory(),
        )
    }

    pub fn with_broken_covers(entities: &[u64]) -> Self {
        Self::build(
            entities,
            RecordingSession::new("recorder", &[]),
            StaticCover::broken(),
            HistoryHandle::spawn_in_memory(),
        )
    }

    pub fn with_history(entities: &[u64], history: HistoryHandle) -> Self {
        Self::build(
            entities,
            RecordingSession::new("recorder", &[]),
            StaticCover::available(),
            history,
        )
    }

    /// Deliveries hang for `delay`, keeping ticks in flight
    pub fn with_slow_delivery(entities: &[u64], delay: Duration) -> Self {
        Self::build(
            entities,
            RecordingSession::slow("recorder", delay),
            StaticCover::available(),
            HistoryHandle::spawn_in_memory(),
        )
    }

    fn build(
        entities: &[u64],
        session: Arc<RecordingSession>,
        covers: Arc<StaticCover>,
        history: HistoryHandle,
    ) -> Self {
        let source = Arc::new(ScriptedSource::default());
        let directory = Arc::new(Directory::new());
        for &entity in entities {
            for destination in DESTINATIONS {
                directory.subscribe(EntityId(entity), DestinationId(destination));
            }
        }
        for destination in DESTINATIONS {
            directory.set_notice(DestinationId(destination), true);
        }

        let sessions = StaticSessions::new(vec![session.clone()]);
        let cache = Arc::new(StateCache::new());

        let engine = PollEngine::new(
            source.clone(),
            cache.clone(),
            history.clone(),
            NotificationFanout::new(directory.clone(), directory.clone()),
            directory.clone(),
            Arc::new(sessions),
            Renderer::new(covers),
        );

        Self {
            source,
            directory,
            session,
            cache,
            history,
            engine,
        }
    }

    /// Put a room into the cache as if it had been polled before
    pub fn seed(&self, entity: u64, status: LiveStatus, title: &str) {
        self.cache.set(
            EntityId(entity),
            EntityState {
                status,
                title: title.to_string(),
                host_name: format!("host-{entity}"),
            },
        );
    }

    /// Overwrite the cached status, keeping title and host name
    pub fn force_status(&self, entity: u64, status: LiveStatus) {
        let mut state = self.cached(entity).expect("room must be cached first");
        state.status = status;
        self.cache.set(EntityId(entity), state);
    }

    pub fn cached(&self, entity: u64) -> Option<EntityState> {
        self.cache.get(EntityId(entity))
    }

    /// Transitions recorded for a room, after all queued writes
    pub async fn recorded(&self, entity: u64) -> Vec<livewatch::storage::TransitionEvent> {
        self.history.flush().await.unwrap();
        self.history.latest(EntityId(entity), 100).await.unwrap()
    }
}
