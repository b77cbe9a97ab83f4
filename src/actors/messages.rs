//! Message types for actor communication
//!
//! Every actor owns an mpsc command channel. Requests that expect an answer
//! carry a oneshot sender (`respond_to`).

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::engine::TickReport;
use crate::source::SourceError;
use crate::storage::TransitionEvent;
use crate::{EntityId, EntityState};

/// Commands that can be sent to the PollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Run a tick right away with the current cadence's batch selection
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<TickReport>>,
    },

    /// Bootstrap a room that was just subscribed
    Track {
        entity: EntityId,
        respond_to: oneshot::Sender<Result<EntityState, SourceError>>,
    },

    /// Stop after the tick in progress (if any)
    Shutdown,
}

/// Commands that can be sent to the HistoryActor
#[derive(Debug)]
pub enum HistoryCommand {
    /// Append one event (fire-and-forget)
    Record { event: TransitionEvent },

    /// Most recent transitions of one room, oldest first
    Latest {
        entity: EntityId,
        limit: usize,
        respond_to: oneshot::Sender<anyhow::Result<Vec<TransitionEvent>>>,
    },

    /// Answered once every previously queued event has been handled
    Flush { respond_to: oneshot::Sender<()> },

    Stats {
        respond_to: oneshot::Sender<HistoryStats>,
    },

    /// Close the backend; answered when it is closed
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// History recorder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Events appended successfully
    pub recorded: u64,

    /// Events the backend refused
    pub failed: u64,

    pub last_cleanup_time: Option<DateTime<Utc>>,

    /// Events removed by retention cleanup since startup
    pub total_deleted: u64,
}

/// Commands that can be sent to the RefreshActor
#[derive(Debug)]
pub enum RefreshCommand {
    RefreshNow {
        respond_to: oneshot::Sender<anyhow::Result<RefreshReport>>,
    },

    Shutdown,
}

/// Outcome of a host name refresh run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: Vec<EntityId>,
    pub failed: Vec<(EntityId, String)>,
}
