//! # Instruction Sequencer
//!
//! Scripted instruction trials as data. A [`Sequencer`] runs a list of
//! [`Step`]s against the engine's public operations, so variants such as
//! "collect every reward" or "learn the reward values" are JSON, not code:
//!
//! ```json
//! [
//!   {"op": "message", "text": "Collect all the points!"},
//!   {"op": "navigate", "termination": "collect_all"},
//!   {"op": "wait_for_button", "label": "continue"}
//! ]
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{CircleGraph, CurrentStateOptions, NavigateOptions, Termination, TrialPatch};
use crate::model::{StateId, StepBudget};
use crate::render::Mount;
use crate::{Error, Result};

/// Serializable subset of [`Termination`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    #[default]
    Goal,
    CollectAll,
}

impl From<TerminationKind> for Termination {
    fn from(kind: TerminationKind) -> Self {
        match kind {
            TerminationKind::Goal => Termination::Goal,
            TerminationKind::CollectAll => Termination::CollectAll,
        }
    }
}

fn yes() -> bool {
    true
}

fn continue_label() -> String {
    "continue".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Show a message above the graph; `null` clears it.
    Message { text: Option<String> },
    SetReward { state: StateId, reward: f64 },
    SetRewards { rewards: Vec<f64> },
    SetCurrentState {
        state: Option<StateId>,
        #[serde(default = "yes")]
        show_current_edges: bool,
    },
    LoadTrial(TrialPatch),
    Navigate {
        #[serde(default)]
        goal: Option<StateId>,
        /// Non-positive means unbounded; absent keeps the trial's budget.
        #[serde(default)]
        n_steps: Option<i64>,
        #[serde(default)]
        termination: TerminationKind,
        #[serde(default = "yes")]
        leave_open: bool,
        #[serde(default = "yes")]
        leave_state: bool,
    },
    WaitForButton {
        #[serde(default = "continue_label")]
        label: String,
    },
    WaitForKey { key: char },
    /// Wait until every listed state (all states when absent) was hovered.
    WaitHoverAll {
        #[serde(default)]
        states: Option<Vec<StateId>>,
        #[serde(default)]
        nudge: Option<String>,
    },
    Pause { ms: u64 },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::SetReward { .. } => "set_reward",
            Self::SetRewards { .. } => "set_rewards",
            Self::SetCurrentState { .. } => "set_current_state",
            Self::LoadTrial(_) => "load_trial",
            Self::Navigate { .. } => "navigate",
            Self::WaitForButton { .. } => "wait_for_button",
            Self::WaitForKey { .. } => "wait_for_key",
            Self::WaitHoverAll { .. } => "wait_hover_all",
            Self::Pause { .. } => "pause",
        }
    }

    fn navigate_default() -> Self {
        Self::Navigate {
            goal: None,
            n_steps: None,
            termination: TerminationKind::Goal,
            leave_open: true,
            leave_state: true,
        }
    }

    async fn apply<M: Mount>(&self, cg: &mut CircleGraph<M>) -> Result<()> {
        match self {
            Self::Message { text } => {
                cg.scene_mut().message = text.clone();
                cg.refresh();
            }
            Self::SetReward { state, reward } => cg.set_reward(*state, *reward)?,
            Self::SetRewards { rewards } => cg.set_rewards(rewards)?,
            Self::SetCurrentState { state, show_current_edges } => cg.set_current_state(
                *state,
                CurrentStateOptions { show_current_edges: *show_current_edges },
            )?,
            Self::LoadTrial(patch) => cg.load_trial(patch.clone())?,
            Self::Navigate { goal, n_steps, termination, leave_open, leave_state } => {
                let options = NavigateOptions {
                    goal: *goal,
                    n_steps: n_steps.map(|n| StepBudget::from_config(Some(n))),
                    termination: (*termination).into(),
                    leave_open: *leave_open,
                    leave_state: *leave_state,
                };
                cg.navigate(options).await?;
            }
            Self::WaitForButton { label } => cg.wait_for_button(label).await?,
            Self::WaitForKey { key } => cg.wait_for_key(*key).await?,
            Self::WaitHoverAll { states, nudge } => {
                let states = match states {
                    Some(states) => states.clone(),
                    None => cg.graph().states().collect(),
                };
                cg.wait_for_hover_all(states, nudge.clone()).await?;
            }
            Self::Pause { ms } => cg.pause(Duration::from_millis(*ms)).await?,
        }
        Ok(())
    }
}

// ============================================================================
// Sequencer
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequencer {
    steps: Vec<Step>,
}

impl Sequencer {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid instruction script: {e}")))
    }

    /// The plain trial: navigate to the goal.
    pub fn navigate_only() -> Self {
        Self::new(vec![Step::navigate_default()])
    }

    /// Navigate until no positive reward is left.
    pub fn collect_all(message: impl Into<String>) -> Self {
        Self::new(vec![
            Step::Message { text: Some(message.into()) },
            Step::Navigate {
                goal: None,
                n_steps: None,
                termination: TerminationKind::CollectAll,
                leave_open: true,
                leave_state: true,
            },
            Step::Message { text: None },
        ])
    }

    /// One short navigation per reward vector, restaged from `start`.
    pub fn learn_rewards(start: StateId, rounds: Vec<Vec<f64>>, n_steps: i64) -> Self {
        let mut steps = Vec::with_capacity(rounds.len() * 2);
        for rewards in rounds {
            steps.push(Step::LoadTrial(TrialPatch { start, rewards, n_steps: Some(n_steps) }));
            steps.push(Step::Navigate {
                goal: None,
                n_steps: None,
                termination: TerminationKind::Goal,
                leave_open: true,
                leave_state: true,
            });
        }
        Self::new(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order; stops at the first error.
    pub async fn run<M: Mount>(&self, cg: &mut CircleGraph<M>) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            debug!(step = i, op = step.op(), "instruction step");
            step.apply(cg).await?;
        }
        info!(steps = self.steps.len(), score = cg.score(), "instruction script finished");
        Ok(())
    }
}
