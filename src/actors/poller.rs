//! PollerActor - drives the poll engine on the cadence
//!
//! ## Message Flow
//!
//! ```text
//! deadline → plan cadence (local time) → engine.tick(selection) → next deadline
//!     ↑
//!     └─── Commands (PollNow, Track, Shutdown)
//! ```
//!
//! Ticks and commands are handled by the same loop, so two ticks never
//! overlap. The period is re-planned after every tick, which moves the poller
//! between the day and night cadence without a restart.

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{PollEngine, TickReport};
use crate::monitors::cadence::{Cadence, CadencePolicy};
use crate::source::SourceError;
use crate::{EntityId, EntityState};

use super::messages::PollerCommand;

pub struct PollerActor {
    engine: PollEngine,
    policy: CadencePolicy,
    command_rx: mpsc::Receiver<PollerCommand>,
}

impl PollerActor {
    pub fn new(
        engine: PollEngine,
        policy: CadencePolicy,
        command_rx: mpsc::Receiver<PollerCommand>,
    ) -> Self {
        Self {
            engine,
            policy,
            command_rx,
        }
    }

    fn plan(&self) -> Cadence {
        self.policy.plan(Local::now().time())
    }

    #[instrument(skip(self), fields(path = ?self.policy.path()))]
    pub async fn run(mut self) {
        let mut cadence = self.plan();
        info!(
            "starting poller (every {}s, {:?})",
            cadence.period.as_secs(),
            cadence.selection
        );

        let mut deadline = Instant::now() + cadence.period;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.run_tick(cadence).await;

                    let next = self.plan();
                    if next != cadence {
                        info!(
                            "cadence changed to every {}s, {:?}",
                            next.period.as_secs(),
                            next.selection
                        );
                    }
                    cadence = next;
                    deadline = Instant::now() + cadence.period;
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.engine.tick(self.plan().selection).await;
                            let _ = respond_to.send(result);
                        }

                        PollerCommand::Track { entity, respond_to } => {
                            debug!("tracking room {entity}");
                            let _ = respond_to.send(self.engine.track(entity).await);
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("poller stopped");
    }

    async fn run_tick(&self, cadence: Cadence) {
        match self.engine.tick(cadence.selection).await {
            Ok(report) if report.skipped => {}
            Ok(report) => {
                for (entity, kind) in report.transitions() {
                    debug!("room {entity}: {kind}");
                }
            }
            Err(e) => error!("poll tick failed: {:#}", e),
        }
    }
}

/// Handle for controlling the PollerActor
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    pub fn spawn(engine: PollEngine, policy: CadencePolicy) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = PollerActor::new(engine, policy, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a tick now, bypassing the timer
    pub async fn poll_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Bootstrap a newly subscribed room
    pub async fn track(&self, entity: EntityId) -> Result<Result<EntityState, SourceError>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::Track {
                entity,
                respond_to: tx,
            })
            .await
            .context("failed to send Track command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
