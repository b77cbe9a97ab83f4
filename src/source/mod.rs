//! Upstream live source
//!
//! The poller only ever talks to the upstream through the [`LiveSource`] trait,
//! so the engine can be driven by a scripted source in tests.
//!
//! ## Error Taxonomy
//!
//! - **NetworkFailure**: transient, the entity is skipped and retried next tick
//! - **NotFound**: the room (or user) no longer exists upstream
//! - **AuthInvalid**: the configured credential is missing or expired; read-only
//!   endpoints usually keep working, so polling continues degraded

pub mod bilibili;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityId, RoomSnapshot};

pub use bilibili::BilibiliClient;

/// Errors returned by a [`LiveSource`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("credential invalid: {0}")]
    AuthInvalid(String),
}

impl SourceError {
    /// Whether the next tick may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::NetworkFailure(_))
    }
}

/// The account the credential belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: u64,
    pub name: String,
}

/// Client for the upstream live platform
///
/// Implementations must be safe to call concurrently for distinct rooms.
#[async_trait]
pub trait LiveSource: Send + Sync {
    /// Fetch the current status of a room
    async fn fetch_status(&self, entity: EntityId) -> Result<RoomSnapshot, SourceError>;

    /// Resolve the display name of a room owner
    async fn fetch_host_name(&self, host_id: u64) -> Result<String, SourceError>;

    /// Check that the configured credential is accepted
    async fn verify_credential(&self) -> Result<Identity, SourceError>;
}
