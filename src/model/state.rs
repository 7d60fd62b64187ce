//! State identifiers, step budgets and the mutable per-trial state.

use serde::{Deserialize, Serialize};

/// Dense state identifier in `0..N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for StateId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Step budget
// ============================================================================

/// How many accepted transitions a navigation may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepBudget {
    #[default]
    Unbounded,
    Bounded(u32),
}

impl StepBudget {
    /// Interpret the configuration convention: absent, zero or negative
    /// means unbounded.
    pub fn from_config(n_steps: Option<i64>) -> Self {
        match n_steps {
            Some(n) if n > 0 => Self::Bounded(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => Self::Unbounded,
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Bounded(_))
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(*n),
        }
    }

    /// Spend one step. No-op when unbounded.
    pub fn decrement(&mut self) {
        if let Self::Bounded(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Bounded(0))
    }
}

impl std::fmt::Display for StepBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbounded => write!(f, "∞"),
            Self::Bounded(n) => write!(f, "{n}"),
        }
    }
}

// ============================================================================
// TrialState
// ============================================================================

/// Everything the engine treats as truth during a trial.
///
/// Mutated only through the engine (`visit_state`, `set_reward(s)`,
/// `set_score`); the render layer is derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialState {
    pub(crate) current: Option<StateId>,
    pub(crate) rewards: Vec<f64>,
    pub(crate) score: f64,
    pub(crate) steps_left: StepBudget,
    pub(crate) goal: Option<StateId>,
    pub(crate) consume: bool,
}

impl TrialState {
    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    pub fn reward(&self, state: StateId) -> f64 {
        self.rewards.get(state.index()).copied().unwrap_or(0.0)
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn steps_left(&self) -> StepBudget {
        self.steps_left
    }

    pub fn goal(&self) -> Option<StateId> {
        self.goal
    }

    pub fn consume(&self) -> bool {
        self.consume
    }

    /// True when no state still holds a positive reward.
    pub fn all_collected(&self) -> bool {
        self.rewards.iter().all(|r| *r <= 0.0)
    }
}
