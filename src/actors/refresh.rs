//! RefreshActor - daily host name refresh
//!
//! Owners rename themselves; once a day (at `host_refresh_at`, local time)
//! every subscribed room's owner name is resolved again and written to the
//! state cache and the subscription store.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::PollEngine;

use super::messages::{RefreshCommand, RefreshReport};

pub struct RefreshActor {
    engine: PollEngine,
    at: NaiveTime,
    command_rx: mpsc::Receiver<RefreshCommand>,
}

impl RefreshActor {
    pub fn new(engine: PollEngine, at: NaiveTime, command_rx: mpsc::Receiver<RefreshCommand>) -> Self {
        Self {
            engine,
            at,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(at = %self.at))]
    pub async fn run(mut self) {
        debug!("starting host name refresh actor");

        loop {
            let wait = until_next(Local::now().naive_local(), self.at);
            debug!("next host name refresh in {}s", wait.as_secs());

            tokio::select! {
                _ = sleep(wait) => {
                    match refresh_host_names(&self.engine).await {
                        Ok(report) => info!(
                            "host names refreshed ({} updated, {} failed)",
                            report.updated.len(),
                            report.failed.len()
                        ),
                        Err(e) => error!("host name refresh failed: {:#}", e),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RefreshCommand::RefreshNow { respond_to } => {
                            let _ = respond_to.send(refresh_host_names(&self.engine).await);
                        }
                        RefreshCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("host name refresh actor stopped");
    }
}

/// Time left until the next occurrence of `at` (a full day when it is exactly now)
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };

    (next - now).to_std().unwrap_or_default()
}

/// Resolve every subscribed room's owner name again
pub async fn refresh_host_names(engine: &PollEngine) -> Result<RefreshReport> {
    let subscribed = engine
        .subscriptions()
        .subscribed_entities()
        .await
        .context("failed to list subscribed rooms")?;

    // one room at a time, the upstream rate-limits bursts
    let mut report = RefreshReport::default();
    for entity in subscribed {
        let result = match engine.refresh_host_name(entity).await {
            Ok(host_name) => engine
                .subscriptions()
                .set_host_name(entity, &host_name)
                .await
                .map_err(|e| format!("{e:#}")),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => report.updated.push(entity),
            Err(e) => {
                warn!("failed to refresh host name of room {entity}: {e}");
                report.failed.push((entity, e));
            }
        }
    }

    Ok(report)
}

/// Handle for controlling the RefreshActor
#[derive(Clone)]
pub struct RefreshHandle {
    sender: mpsc::Sender<RefreshCommand>,
}

impl RefreshHandle {
    pub fn spawn(engine: PollEngine, at: NaiveTime) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = RefreshActor::new(engine, at, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn refresh_now(&self) -> Result<RefreshReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RefreshCommand::RefreshNow { respond_to: tx })
            .await
            .context("failed to send RefreshNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RefreshCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
