//! Poll cycle engine
//!
//! One call to [`PollEngine::tick`] checks a batch of rooms. For every room:
//!
//! ```text
//! fetch ─┬─ error ──────────────────────────────► Err(Fetch), cache untouched
//!        └─ cached? ─ no ─► bootstrap ─┬─ error ─► Err(Bootstrap)
//!               │                      │
//!               └──────── yes ─────────┴─► evaluate ─► title notice / settle
//!                                                     ─► transition: history + fanout
//!                                                     ─► single cache write
//! ```
//!
//! Rooms are processed concurrently. A panic while processing one room is
//! caught and reported for that room only.

pub mod rotation;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use futures::FutureExt;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::history::HistoryHandle;
use crate::cache::StateCache;
use crate::directory::{SessionRegistry, SubscriptionStore};
use crate::monitors::cadence::BatchSelection;
use crate::monitors::live::{LiveEvaluation, TitleChange};
use crate::notify::{FanoutReport, NotificationFanout, Renderer, TransportSession};
use crate::source::{LiveSource, SourceError};
use crate::storage::{TransitionEvent, TransitionKind};
use crate::{EntityId, EntityState};

pub use rotation::RotationQueue;

/// Why a room could not be checked this tick
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(SourceError),

    #[error("bootstrap failed: {0}")]
    Bootstrap(SourceError),

    #[error("processing panicked: {0}")]
    Panicked(String),
}

/// What one room did this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOutcome {
    pub entity: EntityId,
    pub title: TitleChange,
    pub transition: Option<TransitionKind>,

    /// Fanout of the notice sent this tick (empty when nothing was sent)
    pub delivery: FanoutReport,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub selected: Vec<EntityId>,
    pub outcomes: Vec<(EntityId, Result<EntityOutcome, PollError>)>,

    /// Another tick was still running; nothing was checked
    pub skipped: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn outcome(&self, entity: EntityId) -> Option<&Result<EntityOutcome, PollError>> {
        self.outcomes
            .iter()
            .find_map(|(id, outcome)| (*id == entity).then_some(outcome))
    }

    pub fn failures(&self) -> Vec<(EntityId, &PollError)> {
        self.outcomes
            .iter()
            .filter_map(|(entity, outcome)| outcome.as_ref().err().map(|e| (*entity, e)))
            .collect()
    }

    pub fn transitions(&self) -> Vec<(EntityId, TransitionKind)> {
        self.outcomes
            .iter()
            .filter_map(|(entity, outcome)| {
                outcome
                    .as_ref()
                    .ok()
                    .and_then(|o| o.transition)
                    .map(|kind| (*entity, kind))
            })
            .collect()
    }

    /// Some room failed or some delivery failed, but the tick went on
    pub fn is_partial(&self) -> bool {
        self.outcomes.iter().any(|(_, outcome)| match outcome {
            Ok(outcome) => !outcome.delivery.is_complete(),
            Err(_) => true,
        })
    }
}

#[derive(Clone)]
pub struct PollEngine {
    source: Arc<dyn LiveSource>,
    cache: Arc<StateCache>,
    history: HistoryHandle,
    fanout: NotificationFanout,
    subscriptions: Arc<dyn SubscriptionStore>,
    sessions: Arc<dyn SessionRegistry>,
    renderer: Renderer,
    rotation: Arc<Mutex<RotationQueue>>,
    running: Arc<tokio::sync::Mutex<()>>,
}

impl PollEngine {
    pub fn new(
        source: Arc<dyn LiveSource>,
        cache: Arc<StateCache>,
        history: HistoryHandle,
        fanout: NotificationFanout,
        subscriptions: Arc<dyn SubscriptionStore>,
        sessions: Arc<dyn SessionRegistry>,
        renderer: Renderer,
    ) -> Self {
        Self {
            source,
            cache,
            history,
            fanout,
            subscriptions,
            sessions,
            renderer,
            rotation: Arc::new(Mutex::new(RotationQueue::new())),
            running: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Replace the rotation queue (seeded queues make pool mode reproducible)
    pub fn with_rotation(mut self, rotation: RotationQueue) -> Self {
        self.rotation = Arc::new(Mutex::new(rotation));
        self
    }

    pub fn source(&self) -> &Arc<dyn LiveSource> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn subscriptions(&self) -> &Arc<dyn SubscriptionStore> {
        &self.subscriptions
    }

    pub fn history(&self) -> &HistoryHandle {
        &self.history
    }

    /// Run one poll cycle
    ///
    /// Only listing the subscriptions can fail the whole tick; everything
    /// else is reported per room.
    #[instrument(skip(self))]
    pub async fn tick(&self, selection: BatchSelection) -> anyhow::Result<TickReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("previous tick still running, skipping");
            return Ok(TickReport::skipped());
        };

        let subscribed = self
            .subscriptions
            .subscribed_entities()
            .await
            .context("failed to list subscribed rooms")?;

        let selected = match selection {
            BatchSelection::Full => subscribed,
            BatchSelection::Rotating { batch_size } => self.draw(batch_size, &subscribed),
        };

        let sessions = self.sessions.active_sessions().await;
        debug!(
            "checking {} rooms over {} sessions",
            selected.len(),
            sessions.len()
        );

        let outcomes = join_all(selected.iter().map(|&entity| {
            let sessions = &sessions;
            async move {
                let outcome = AssertUnwindSafe(self.check_entity(entity, sessions))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        error!("processing of room {entity} panicked: {message}");
                        Err(PollError::Panicked(message))
                    });
                (entity, outcome)
            }
        }))
        .await;

        let report = TickReport {
            selected,
            outcomes,
            skipped: false,
        };

        if report.is_partial() {
            warn!(
                "tick finished with {} failed rooms",
                report.failures().len()
            );
        } else {
            debug!("tick finished");
        }

        Ok(report)
    }

    /// Check a single room and apply the result
    #[instrument(skip(self, sessions), fields(entity = %entity))]
    pub async fn check_entity(
        &self,
        entity: EntityId,
        sessions: &[Arc<dyn TransportSession>],
    ) -> Result<EntityOutcome, PollError> {
        let snapshot = self.source.fetch_status(entity).await.map_err(|e| {
            log_source_error(entity, &e);
            PollError::Fetch(e)
        })?;

        let cached = match self.cache.get(entity) {
            Some(state) => state,
            None => {
                info!("room {entity} is not cached yet, bootstrapping");
                self.cache
                    .initialize(self.source.as_ref(), entity)
                    .await
                    .map_err(|e| {
                        log_source_error(entity, &e);
                        PollError::Bootstrap(e)
                    })?
            }
        };

        let evaluation = LiveEvaluation::evaluate(&cached, &snapshot);
        let mut delivery = FanoutReport::default();

        match evaluation.title {
            TitleChange::Notify => {
                info!("room {entity} changed title to [{}]", snapshot.title);
                let message = self.renderer.title_change(&cached.host_name, &snapshot).await;
                delivery = self.fanout.notify(entity, &message, sessions).await;
            }
            TitleChange::Settled => {
                debug!("title settled with stream start: [{}]", snapshot.title);
            }
            TitleChange::Unchanged => {}
        }

        if let Some(kind) = evaluation.transition {
            let event = TransitionEvent::from_snapshot(&snapshot, &cached.host_name);
            info!("room {entity}: {} -> {} ({kind})", cached.status, snapshot.status);
            self.history.record(event);

            let message = self
                .renderer
                .transition(kind, &cached.host_name, &snapshot)
                .await;
            delivery = self.fanout.notify(entity, &message, sessions).await;
        }

        // host_name belongs to the daily refresh, which may have run while we awaited
        if snapshot.status != cached.status || snapshot.title != cached.title {
            let status = snapshot.status;
            let title = snapshot.title;
            let updated = self.cache.update(entity, |state| {
                state.status = status;
                state.title = title.clone();
            });
            if !updated {
                debug!("room {entity} left the cache during the tick, restoring it");
                self.cache.set(
                    entity,
                    EntityState {
                        status,
                        title,
                        host_name: cached.host_name,
                    },
                );
            }
        }

        Ok(EntityOutcome {
            entity,
            title: evaluation.title,
            transition: evaluation.transition,
            delivery,
        })
    }

    /// Bootstrap a room that was just subscribed
    pub async fn track(&self, entity: EntityId) -> Result<EntityState, SourceError> {
        self.cache.initialize(self.source.as_ref(), entity).await
    }

    /// Re-resolve the owner name of a room and store it in the cache
    #[instrument(skip(self), fields(entity = %entity))]
    pub async fn refresh_host_name(&self, entity: EntityId) -> Result<String, SourceError> {
        let snapshot = self.source.fetch_status(entity).await?;
        let host_name = self.source.fetch_host_name(snapshot.host_id).await?;

        if !self.cache.update_host_name(entity, host_name.clone()) {
            debug!("room {entity} is not cached, host name not stored in cache");
        }

        Ok(host_name)
    }

    fn draw(&self, batch_size: usize, subscribed: &[EntityId]) -> Vec<EntityId> {
        self.rotation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .draw(batch_size, subscribed)
    }
}

fn log_source_error(entity: EntityId, error: &SourceError) {
    match error {
        SourceError::NetworkFailure(_) => error!("room {entity}: {error}"),
        SourceError::NotFound(_) => warn!("room {entity} no longer exists upstream: {error}"),
        SourceError::AuthInvalid(_) => warn!("room {entity}: {error}"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
