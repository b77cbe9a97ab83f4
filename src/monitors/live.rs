use crate::storage::TransitionKind;
use crate::{EntityState, LiveStatus, RoomSnapshot};

/// What happened to the title between two polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleChange {
    Unchanged,

    /// The room just went live with a new title; stored without a notice
    Settled,

    /// The room stayed live and renamed its stream
    Notify,
}

/// Result of comparing a fresh snapshot with the cached state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveEvaluation {
    pub title: TitleChange,
    pub transition: Option<TransitionKind>,
}

impl LiveEvaluation {
    pub fn evaluate(cached: &EntityState, snapshot: &RoomSnapshot) -> LiveEvaluation {
        let status_changed = cached.status != snapshot.status;
        let title_changed = cached.title != snapshot.title;
        let is_live = snapshot.status == LiveStatus::Live;

        let title = match (title_changed, is_live, status_changed) {
            (false, _, _) | (true, false, _) => TitleChange::Unchanged,
            // start-of-stream: the new title travels with the LiveStart notice
            (true, true, true) => TitleChange::Settled,
            (true, true, false) => TitleChange::Notify,
        };

        let transition = status_changed.then(|| TransitionKind::entering(snapshot.status));

        LiveEvaluation { title, transition }
    }
}
