pub mod actors;
pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod monitors;
pub mod notify;
pub mod source;
pub mod storage;
pub mod util;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a monitored live room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a chat group or channel that can receive notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observed state of a live room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Offline,
    Live,
    /// The room is not streaming but replays a playlist
    Cycling,
}

impl LiveStatus {
    /// Map the upstream status code (0, 1, 2)
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LiveStatus::Offline),
            1 => Some(LiveStatus::Live),
            2 => Some(LiveStatus::Cycling),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            LiveStatus::Offline => 0,
            LiveStatus::Live => 1,
            LiveStatus::Cycling => 2,
        }
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveStatus::Offline => write!(f, "offline"),
            LiveStatus::Live => write!(f, "live"),
            LiveStatus::Cycling => write!(f, "cycling"),
        }
    }
}

/// Result of a single status fetch from the upstream source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub entity_id: EntityId,
    pub status: LiveStatus,
    pub title: String,
    pub cover_url: Option<String>,

    /// Upstream user id of the room owner
    pub host_id: u64,

    /// Start time as reported by the upstream (free-form text)
    pub live_since: Option<String>,

    pub observed_at: DateTime<Utc>,
}

/// Last known state of a room, as kept by the [`cache::StateCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub status: LiveStatus,
    pub title: String,
    pub host_name: String,
}
