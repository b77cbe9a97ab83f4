//! Actor-based runtime
//!
//! Each actor runs as an independent tokio task and is controlled through a
//! cloneable handle that wraps its mpsc command channel.
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │   Hub (main)    │
//!                  └────────┬────────┘
//!                           │ spawns
//!          ┌────────────────┼────────────────┐
//!          │                │                │
//!  ┌───────▼───────┐ ┌──────▼──────┐ ┌───────▼───────┐
//!  │ PollerActor   │ │ RefreshActor│ │ HistoryActor  │
//!  │ (cadence)     │ │ (daily)     │ │ (persistence) │
//!  └───────┬───────┘ └──────┬──────┘ └───────▲───────┘
//!          │ tick           │ host names     │ record (try_send)
//!          └────────► PollEngine ────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **PollerActor**: runs poll ticks on the cadence, never overlapping
//! - **RefreshActor**: re-resolves room owner names once a day
//! - **HistoryActor**: appends transition events to the history backend

pub mod history;
pub mod messages;
pub mod poller;
pub mod refresh;
