//! HistoryActor - persists transition events
//!
//! The poll engine hands events over with a non-blocking `try_send`, so a slow
//! or broken database never delays notifications. Append failures are logged
//! and counted; they never travel back to the engine.
//!
//! When a retention period is configured, events older than it are deleted
//! on startup and then once a day.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, info, instrument, trace};

use crate::EntityId;
use crate::storage::{HistoryBackend, MemoryBackend, TransitionEvent};

use super::messages::{HistoryCommand, HistoryStats};

/// Queue depth between the engine and the actor
const QUEUE_CAPACITY: usize = 256;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct HistoryActor {
    backend: Box<dyn HistoryBackend>,
    command_rx: mpsc::Receiver<HistoryCommand>,
    retention_days: Option<u32>,
    stats: HistoryStats,
}

impl HistoryActor {
    pub fn new(
        command_rx: mpsc::Receiver<HistoryCommand>,
        backend: Box<dyn HistoryBackend>,
        retention_days: Option<u32>,
    ) -> Self {
        if let Some(days) = retention_days {
            debug!("retention cleanup enabled: {} days", days);
        }

        Self {
            backend,
            command_rx,
            retention_days,
            stats: HistoryStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting history actor");

        let has_retention = self.retention_days.is_some();
        let mut cleanup_interval = time::interval(CLEANUP_INTERVAL);
        // the first tick of an interval fires immediately, which doubles as the startup cleanup

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    if let HistoryCommand::Shutdown { respond_to } = cmd {
                        debug!("received shutdown command");
                        self.close().await;
                        let _ = respond_to.send(());
                        return;
                    }
                    self.handle_command(cmd).await;
                }

                _ = cleanup_interval.tick(), if has_retention => {
                    self.run_cleanup().await;
                }

                else => {
                    debug!("command channel closed, shutting down");
                    break;
                }
            }
        }

        self.close().await;
    }

    async fn handle_command(&mut self, cmd: HistoryCommand) {
        match cmd {
            HistoryCommand::Record { event } => self.append(event).await,

            HistoryCommand::Latest {
                entity,
                limit,
                respond_to,
            } => {
                let result = self
                    .backend
                    .query_latest(entity, limit)
                    .await
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            HistoryCommand::Flush { respond_to } => {
                trace!("flush barrier reached");
                let _ = respond_to.send(());
            }

            HistoryCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.stats.clone());
            }

            // handled by the run loop
            HistoryCommand::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    async fn append(&mut self, event: TransitionEvent) {
        let summary = event.summary.clone();

        match self.backend.append(event).await {
            Ok(()) => {
                self.stats.recorded += 1;
                info!("{summary}");
            }
            Err(e) => {
                self.stats.failed += 1;
                error!("failed to persist transition ({summary}): {e}");
            }
        }
    }

    async fn run_cleanup(&mut self) {
        let Some(retention_days) = self.retention_days else {
            return;
        };

        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        debug!("running retention cleanup (deleting events before {})", cutoff);

        match self.backend.cleanup_before(cutoff).await {
            Ok(deleted) => {
                self.stats.total_deleted += deleted as u64;
                self.stats.last_cleanup_time = Some(Utc::now());
                if deleted > 0 {
                    info!("retention cleanup complete: deleted {} old events", deleted);
                }
            }
            Err(e) => {
                error!("failed to clean up old events: {}", e);
            }
        }
    }

    async fn close(&mut self) {
        debug!("closing history backend");
        if let Err(e) = self.backend.close().await {
            error!("error closing backend: {}", e);
        }
    }
}

/// Handle for controlling the HistoryActor
#[derive(Clone)]
pub struct HistoryHandle {
    sender: mpsc::Sender<HistoryCommand>,
}

impl HistoryHandle {
    pub fn spawn(backend: Box<dyn HistoryBackend>, retention_days: Option<u32>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(QUEUE_CAPACITY);

        let actor = HistoryActor::new(cmd_rx, backend, retention_days);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// History kept in memory only
    pub fn spawn_in_memory() -> Self {
        Self::spawn(Box::new(MemoryBackend::new()), None)
    }

    /// Queue an event without waiting; a full or closed queue loses the event
    pub fn record(&self, event: TransitionEvent) {
        match self.sender.try_send(HistoryCommand::Record { event }) {
            Ok(()) => {}
            Err(TrySendError::Full(HistoryCommand::Record { event })) => {
                error!("history queue full, dropping: {}", event.summary);
            }
            Err(TrySendError::Closed(HistoryCommand::Record { event })) => {
                error!("history recorder stopped, dropping: {}", event.summary);
            }
            Err(_) => {}
        }
    }

    pub async fn latest(&self, entity: EntityId, limit: usize) -> Result<Vec<TransitionEvent>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HistoryCommand::Latest {
                entity,
                limit,
                respond_to: tx,
            })
            .await
            .context("failed to send Latest command")?;

        rx.await.context("failed to receive response")?
    }

    /// Wait until every event queued before this call has been handled
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HistoryCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HistoryCommand::Stats { respond_to: tx })
            .await
            .context("failed to send Stats command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HistoryCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("failed to receive response")
    }
}
