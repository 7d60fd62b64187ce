//! Hover-completion gate: a set-membership counter with a single waiter.

use std::time::Duration;

use hashbrown::HashSet;

use crate::model::StateId;

/// After this long without completion a nudge is shown. The wait goes on.
pub const HOVER_NUDGE_AFTER: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverGate {
    pending: HashSet<StateId>,
    total: usize,
}

impl HoverGate {
    pub fn new(states: impl IntoIterator<Item = StateId>) -> Self {
        let pending: HashSet<StateId> = states.into_iter().collect();
        let total = pending.len();
        Self { pending, total }
    }

    /// Record a hover. Returns true the first time `state` is seen.
    pub fn mark(&mut self, state: StateId) -> bool {
        self.pending.remove(&state)
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn hovered(&self) -> usize {
        self.total - self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}
