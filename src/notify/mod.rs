//! Notification fanout
//!
//! A notice about one room goes to every destination that both has the notice
//! permission and subscribes to the room, through every active transport
//! session. Each (destination, session) pair gets exactly one attempt; a
//! failure is logged and recorded but never stops the remaining pairs.

pub mod discord;
pub mod onebot;
pub mod render;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

use crate::directory::{DestinationRegistry, SubscriptionStore};
use crate::{DestinationId, EntityId};

pub use discord::DiscordSession;
pub use onebot::OneBotSession;
pub use render::{CoverFetcher, HttpCoverFetcher, Renderer};

/// Payload of a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationMessage {
    /// Cover image with a caption underneath
    Image { image: Vec<u8>, caption: String },
    Text { text: String },
}

impl NotificationMessage {
    /// Text part of the message
    pub fn caption(&self) -> &str {
        match self {
            NotificationMessage::Image { caption, .. } => caption,
            NotificationMessage::Text { text } => text,
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, NotificationMessage::Image { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("rejected by transport: {0}")]
    Rejected(String),

    #[error("no route to destination {0}")]
    UnknownDestination(DestinationId),
}

/// A connected chat transport (bot account, webhook set, ...)
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    async fn send(
        &self,
        destination: DestinationId,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub destination: DestinationId,
    pub session: String,
    pub error: DeliveryError,
}

/// Outcome of one fanout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Destinations that were resolved for the room
    pub destinations: Vec<DestinationId>,
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct NotificationFanout {
    subscriptions: Arc<dyn SubscriptionStore>,
    destinations: Arc<dyn DestinationRegistry>,
}

impl NotificationFanout {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        destinations: Arc<dyn DestinationRegistry>,
    ) -> Self {
        Self {
            subscriptions,
            destinations,
        }
    }

    /// Destinations entitled to notices about `entity`, sorted
    pub async fn resolve(&self, entity: EntityId) -> anyhow::Result<Vec<DestinationId>> {
        let permitted: HashSet<DestinationId> = self
            .destinations
            .notice_destinations()
            .await?
            .into_iter()
            .collect();

        let mut resolved: Vec<DestinationId> = self
            .subscriptions
            .destinations_for(entity)
            .await?
            .into_iter()
            .filter(|destination| permitted.contains(destination))
            .collect();
        resolved.sort();
        resolved.dedup();

        Ok(resolved)
    }

    #[instrument(skip(self, message, sessions), fields(entity = %entity, sessions = sessions.len()))]
    pub async fn notify(
        &self,
        entity: EntityId,
        message: &NotificationMessage,
        sessions: &[Arc<dyn TransportSession>],
    ) -> FanoutReport {
        let destinations = match self.resolve(entity).await {
            Ok(destinations) => destinations,
            Err(e) => {
                error!("failed to resolve destinations: {e:#}");
                return FanoutReport::default();
            }
        };

        if destinations.is_empty() {
            debug!("no destination wants notices for this room");
        }

        let pairs = destinations
            .iter()
            .flat_map(|&destination| sessions.iter().map(move |session| (destination, session)));

        let results = join_all(pairs.map(|(destination, session)| async move {
            let result = session.send(destination, message).await;
            (destination, session.name().to_string(), result)
        }))
        .await;

        let mut report = FanoutReport {
            destinations,
            attempted: results.len(),
            ..Default::default()
        };

        for (destination, session, result) in results {
            match result {
                Ok(()) => {
                    trace!("delivered to {destination} via {session}");
                    report.delivered += 1;
                }
                Err(error) => {
                    warn!("delivery to {destination} via {session} failed: {error}");
                    report.failures.push(DeliveryFailure {
                        destination,
                        session,
                        error,
                    });
                }
            }
        }

        debug!(
            "fanout finished ({}/{} delivered)",
            report.delivered, report.attempted
        );

        report
    }
}
