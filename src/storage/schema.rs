//! Transition history records
//!
//! Every detected status change of a room produces exactly one
//! [`TransitionEvent`]. Events are append-only: nothing in this crate mutates
//! or deletes them except the retention cleanup.
//!
//! The raw upstream snapshot is kept as JSON text so the record stays readable
//! even if the snapshot struct evolves.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, LiveStatus, RoomSnapshot};

/// Kind of status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The room went live
    LiveStart,

    /// The room went offline
    LiveEnd,

    /// The room stopped streaming and started its replay playlist
    LiveEndViaCycle,
}

impl TransitionKind {
    /// The transition implied by reaching `status`
    pub fn entering(status: LiveStatus) -> Self {
        match status {
            LiveStatus::Live => TransitionKind::LiveStart,
            LiveStatus::Offline => TransitionKind::LiveEnd,
            LiveStatus::Cycling => TransitionKind::LiveEndViaCycle,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::LiveStart => write!(f, "live_start"),
            TransitionKind::LiveEnd => write!(f, "live_end"),
            TransitionKind::LiveEndViaCycle => write!(f, "live_end_with_playlist"),
        }
    }
}

impl FromStr for TransitionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live_start" => Ok(TransitionKind::LiveStart),
            "live_end" => Ok(TransitionKind::LiveEnd),
            "live_end_with_playlist" => Ok(TransitionKind::LiveEndViaCycle),
            other => Err(format!("unknown transition kind '{other}'")),
        }
    }
}

/// A single recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// When the transition was detected (always UTC)
    pub timestamp: DateTime<Utc>,

    pub entity_id: EntityId,

    pub host_name: String,

    pub kind: TransitionKind,

    /// Upstream snapshot that triggered the transition, as JSON
    pub raw_snapshot: String,

    /// One-line human readable summary
    pub summary: String,
}

impl TransitionEvent {
    /// Build the event for a snapshot whose status differs from the cached one
    pub fn from_snapshot(snapshot: &RoomSnapshot, host_name: &str) -> Self {
        let kind = TransitionKind::entering(snapshot.status);

        let summary = match kind {
            TransitionKind::LiveStart => format!(
                "LiveStart! Room: {}/{}, Title: {}, TrueTime: {}",
                snapshot.entity_id,
                host_name,
                snapshot.title,
                snapshot.live_since.as_deref().unwrap_or("unknown")
            ),
            TransitionKind::LiveEnd | TransitionKind::LiveEndViaCycle => {
                format!("LiveEnd! Room: {}/{}", snapshot.entity_id, host_name)
            }
        };

        // RoomSnapshot only holds strings, numbers and a timestamp, so this cannot fail
        let raw_snapshot = serde_json::to_string(snapshot).unwrap_or_default();

        Self {
            timestamp: Utc::now(),
            entity_id: snapshot.entity_id,
            host_name: host_name.to_string(),
            kind,
            raw_snapshot,
            summary,
        }
    }
}
