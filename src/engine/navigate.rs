//! The asynchronous navigation loop and the input waits it is built on.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashSet;
use serde_json::json;
use smallvec::SmallVec;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use super::hover::{HoverGate, HOVER_NUDGE_AFTER};
use super::input::{Input, InputEvent};
use super::listeners::{ListenerId, ListenerKind};
use super::{CircleGraph, Phase, STEP_DELAY};
use crate::model::{StateId, StepBudget, TrialState};
use crate::render::{CurrentOptions, Mount};
use crate::{Error, Result};

type Predicate = dyn Fn(&TrialState, StateId) -> bool + Send + Sync;

/// When a navigation stops, checked after every accepted transition.
#[derive(Clone, Default)]
pub enum Termination {
    /// The entered state is the goal.
    #[default]
    Goal,
    /// No positive reward is left anywhere.
    CollectAll,
    Custom(Arc<Predicate>),
}

impl Termination {
    pub fn custom(f: impl Fn(&TrialState, StateId) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn is_done(&self, state: &TrialState, entered: StateId) -> bool {
        match self {
            Self::Goal => state.goal() == Some(entered),
            Self::CollectAll => state.all_collected(),
            Self::Custom(f) => f(state, entered),
        }
    }
}

impl std::fmt::Debug for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Goal => f.write_str("Goal"),
            Self::CollectAll => f.write_str("CollectAll"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-call overrides for [`CircleGraph::navigate`].
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Replaces the trial's goal.
    pub goal: Option<StateId>,
    /// Replaces the trial's step budget.
    pub n_steps: Option<StepBudget>,
    pub termination: Termination,
    /// Keep the graph at full opacity after the loop ends; fade otherwise.
    pub leave_open: bool,
    /// Keep the final state highlighted after the loop ends.
    pub leave_state: bool,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            goal: None,
            n_steps: None,
            termination: Termination::Goal,
            leave_open: true,
            leave_state: true,
        }
    }
}

/// Options for [`CircleGraph::click_transition`].
#[derive(Debug, Clone, Default)]
pub struct ClickOptions {
    /// States that may not be clicked. Defaults to the current state and
    /// the goal.
    pub invalid_states: Option<HashSet<StateId>>,
}

impl<M: Mount> CircleGraph<M> {
    // ========================================================================
    // Navigation loop
    // ========================================================================

    /// Run the click-to-move loop until the termination predicate fires,
    /// the step budget runs out, or a dead end is reached.
    pub async fn navigate(&mut self, options: NavigateOptions) -> Result<()> {
        let span = self.span.clone();
        self.navigate_inner(options).instrument(span).await
    }

    async fn navigate_inner(&mut self, options: NavigateOptions) -> Result<()> {
        let NavigateOptions { goal, n_steps, termination, leave_open, leave_state } = options;
        let epoch = self.listeners.epoch();

        // A goal override lasts for this call only.
        let trial_goal = self.state.goal;
        if let Some(goal) = goal {
            self.check_state(goal)?;
            self.show_goal(Some(goal));
        }
        self.state.steps_left = n_steps.unwrap_or(self.config.n_steps);
        self.scene.header.steps = self.state.steps_left;
        let Some(here) = self.state.current else {
            self.show_goal(trial_goal);
            return Err(Error::Precondition("navigate needs a current state".into()));
        };

        info!(
            start = %here,
            goal = ?self.state.goal,
            steps = %self.state.steps_left,
            ?termination,
            "navigation started"
        );
        self.phase = Phase::AwaitingInput;
        self.start_hover_tracking();
        let outcome = match self.visit_state(here, true) {
            Ok(()) => self.step_until_done(&termination, epoch).await,
            Err(e) => Err(e),
        };
        self.stop_hover_tracking();
        self.scene.clear_selectable();
        self.show_goal(trial_goal);
        self.phase = Phase::Terminated;

        if outcome.is_ok() {
            self.scene.clear_current_edges();
            if !leave_state {
                self.scene.set_current(&self.config.graph, None, CurrentOptions::default());
            }
            if !leave_open {
                self.scene.faded = true;
            }
            info!(score = self.state.score, events = self.log.len(), "navigation finished");
        }
        self.render();
        outcome
    }

    async fn step_until_done(&mut self, termination: &Termination, epoch: u64) -> Result<()> {
        loop {
            let here = self
                .state
                .current
                .ok_or_else(|| Error::Precondition("navigation lost its current state".into()))?;
            let successors: SmallVec<[StateId; 4]> =
                self.config.graph.successors(here).iter().copied().collect();
            if successors.is_empty() {
                warn!(state = %here, "dead end; ending navigation");
                self.log.log("dead_end", json!({"state": here}));
                return Ok(());
            }

            let invalid: HashSet<StateId> = self
                .config
                .graph
                .states()
                .filter(|s| !successors.contains(s))
                .collect();
            let next = self
                .click_transition_in(ClickOptions { invalid_states: Some(invalid) }, epoch)
                .await?;

            self.visit_state(next, false)?;
            self.state.steps_left.decrement();
            self.scene.header.steps = self.state.steps_left;
            self.render();

            if termination.is_done(&self.state, next) || self.state.steps_left.is_exhausted() {
                return Ok(());
            }
            self.pause_in(STEP_DELAY, epoch).await?;
        }
    }

    fn show_goal(&mut self, goal: Option<StateId>) {
        self.state.goal = goal;
        self.scene.set_goal(goal);
    }

    fn start_hover_tracking(&mut self) {
        self.scene.hide_states = self.config.hover_rewards;
        self.scene.hide_edges = self.config.hover_edges;
        if (self.config.hover_rewards || self.config.hover_edges) && self.hover_listener.is_none() {
            self.hover_listener = Some(self.listeners.attach(ListenerKind::Hover));
        }
    }

    fn stop_hover_tracking(&mut self) {
        if let Some(id) = self.hover_listener.take() {
            self.listeners.detach(id);
        }
    }

    // ========================================================================
    // Input waits
    // ========================================================================

    /// Resolve with the first clicked state outside `invalid_states`.
    /// Other clicks are ignored.
    pub async fn click_transition(&mut self, options: ClickOptions) -> Result<StateId> {
        let epoch = self.listeners.epoch();
        self.click_transition_in(options, epoch).await
    }

    async fn click_transition_in(&mut self, options: ClickOptions, epoch: u64) -> Result<StateId> {
        let invalid = options.invalid_states.unwrap_or_else(|| {
            self.state.current.into_iter().chain(self.state.goal).collect()
        });
        self.scene.set_selectable(|s| invalid.contains(&s));
        self.render();

        let chosen = self
            .wait_for(ListenerKind::Click, epoch, |cg, input| match input {
                Input::Click(Some(s)) if cg.config.graph.contains(s) && !invalid.contains(&s) => Some(s),
                _ => None,
            })
            .await;

        self.scene.clear_selectable();
        self.render();
        chosen
    }

    /// Show a continue button and wait for it to be pressed.
    pub async fn wait_for_button(&mut self, label: &str) -> Result<()> {
        let epoch = self.listeners.epoch();
        self.scene.button = Some(label.to_string());
        self.render();
        let pressed = self
            .wait_for(ListenerKind::Button, epoch, |_, input| matches!(input, Input::Button).then_some(()))
            .await;
        self.scene.button = None;
        self.render();
        pressed
    }

    /// Wait for a specific key, e.g. `' '` for "press spacebar".
    pub async fn wait_for_key(&mut self, key: char) -> Result<()> {
        let epoch = self.listeners.epoch();
        self.wait_for(ListenerKind::Key, epoch, |_, input| (input == Input::Key(key)).then_some(()))
            .await
    }

    /// Wait until every state in `states` has been hovered at least once.
    /// After [`HOVER_NUDGE_AFTER`] the `nudge` message is shown; the wait
    /// continues.
    pub async fn wait_for_hover_all(
        &mut self,
        states: impl IntoIterator<Item = StateId>,
        nudge: Option<String>,
    ) -> Result<()> {
        let gate = HoverGate::new(states);
        if gate.is_complete() {
            return Ok(());
        }
        let epoch = self.listeners.epoch();
        self.hover_gate = Some(gate);
        let id = self.listeners.attach(ListenerKind::Hover);
        let deadline = Instant::now() + HOVER_NUDGE_AFTER;
        let mut nudged = false;

        let outcome = loop {
            if self.hover_gate.as_ref().is_some_and(HoverGate::is_complete) {
                break Ok(());
            }
            tokio::select! {
                event = self.next_event(id, epoch) => {
                    if let Err(e) = event {
                        break Err(e);
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !nudged => {
                    nudged = true;
                    let remaining = self.hover_gate.as_ref().map_or(0, HoverGate::remaining);
                    self.log.log("hover_nudge", json!({"remaining": remaining}));
                    if nudge.is_some() {
                        self.scene.message = nudge.clone();
                    }
                    self.render();
                }
            }
        };

        self.listeners.detach(id);
        self.hover_gate = None;
        outcome
    }

    /// Attach a listener of `kind`, feed it events until `accept` yields a
    /// value, then detach it.
    async fn wait_for<T>(
        &mut self,
        kind: ListenerKind,
        epoch: u64,
        mut accept: impl FnMut(&Self, Input) -> Option<T>,
    ) -> Result<T> {
        let id = self.listeners.attach(kind);
        let outcome = loop {
            let event = match self.next_event(id, epoch).await {
                Ok(event) => event,
                Err(e) => break Err(e),
            };
            // Anything that happened before we were listening fell on
            // the floor.
            if !self.listeners.heard(id, event.at) {
                continue;
            }
            if let Some(value) = accept(&*self, event.input) {
                break Ok(value);
            }
        };
        self.listeners.detach(id);
        outcome
    }

    /// Wait out `duration`, failing if the engine is cancelled meanwhile.
    /// Score pops that expire during the wait are taken down on time.
    pub async fn pause(&mut self, duration: Duration) -> Result<()> {
        let epoch = self.listeners.epoch();
        self.pause_in(duration, epoch).await
    }

    async fn pause_in(&mut self, duration: Duration, epoch: u64) -> Result<()> {
        let deadline = Instant::now() + duration;
        let listeners = Arc::clone(&self.listeners);
        loop {
            let cancelled = listeners.cancelled();
            tokio::pin!(cancelled);
            cancelled.as_mut().enable();
            if listeners.epoch() != epoch {
                return Err(Error::Cancelled);
            }
            let expiry = self.next_pop_expiry().filter(|at| *at < deadline);

            tokio::select! {
                biased;
                _ = &mut cancelled => continue,
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                _ = tokio::time::sleep_until(expiry.unwrap_or(deadline)), if expiry.is_some() => {
                    self.render();
                }
            }
        }
    }

    /// Next input event while `waiter` is attached and no cancel happened
    /// since `epoch`. Hover events are dispatched on the way through.
    async fn next_event(&mut self, waiter: ListenerId, epoch: u64) -> Result<InputEvent> {
        let listeners = Arc::clone(&self.listeners);
        loop {
            let cancelled = listeners.cancelled();
            tokio::pin!(cancelled);
            cancelled.as_mut().enable();
            if listeners.epoch() != epoch || !listeners.is_attached(waiter) {
                return Err(Error::Cancelled);
            }
            let expiry = self.next_pop_expiry();

            tokio::select! {
                biased;
                _ = &mut cancelled => continue,
                event = self.input_rx.recv() => {
                    let event = event.ok_or(Error::InputClosed)?;
                    self.dispatch_hover(event);
                    return Ok(event);
                }
                _ = tokio::time::sleep_until(expiry.unwrap_or_else(Instant::now)), if expiry.is_some() => {
                    self.render();
                }
            }
        }
    }

    /// When the oldest score pop on screen is due to go.
    fn next_pop_expiry(&self) -> Option<Instant> {
        self.scene
            .pops
            .iter()
            .map(|p| self.log.started() + p.expires_at)
            .min()
    }

    fn dispatch_hover(&mut self, event: InputEvent) {
        let (state, entering) = match event.input {
            Input::MouseEnter(s) => (s, true),
            Input::MouseLeave(s) => (s, false),
            _ => return,
        };
        if !self.config.graph.contains(state) || !self.listeners.any_heard(ListenerKind::Hover, event.at) {
            return;
        }
        let name = if entering { "mouseenter" } else { "mouseleave" };
        self.log.log_at(event.at, name, json!({"state": state}));
        self.scene.set_revealed(&self.config.graph, state, entering);
        if entering {
            if let Some(gate) = self.hover_gate.as_mut() {
                gate.mark(state);
            }
        }
        self.render();
    }
}
