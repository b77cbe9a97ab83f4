//! Rotation queue for pool mode
//!
//! Each tick draws a small random batch from the rooms that have not been
//! polled in the current round. The queue is refilled from the subscription
//! list only once it is empty, so every room is polled exactly once per round.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::trace;

use crate::EntityId;

#[derive(Debug)]
pub struct RotationQueue {
    pending: Vec<EntityId>,
    rng: StdRng,
}

impl RotationQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic draws, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            pending: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rooms still waiting in the current round
    pub fn pending(&self) -> &[EntityId] {
        &self.pending
    }

    /// Draw up to `batch_size` distinct rooms
    ///
    /// Rooms that are no longer in `subscribed` are dropped first. An empty
    /// queue is refilled from `subscribed` (duplicates removed).
    pub fn draw(&mut self, batch_size: usize, subscribed: &[EntityId]) -> Vec<EntityId> {
        let current: HashSet<EntityId> = subscribed.iter().copied().collect();
        self.pending.retain(|entity| current.contains(entity));

        if self.pending.is_empty() {
            let mut seen = HashSet::new();
            self.pending = subscribed
                .iter()
                .copied()
                .filter(|entity| seen.insert(*entity))
                .collect();
            trace!("rotation queue refilled with {} rooms", self.pending.len());
        }

        let amount = batch_size.min(self.pending.len());
        let (drawn, rest) = self.pending.partial_shuffle(&mut self.rng, amount);
        let drawn = drawn.to_vec();
        self.pending = rest.to_vec();

        drawn
    }
}

impl Default for RotationQueue {
    fn default() -> Self {
        Self::new()
    }
}
