//! # CircleGraph Trial Engine
//!
//! Owns one trial: current state, reward vector, score and step budget.
//! Renders a [`Scene`] onto a caller-supplied [`Mount`], turns participant
//! input into validated transitions, and keeps the trial's event log.
//!
//! ```text
//! Constructed ──navigate()──▶ AwaitingInput ──(termination | steps == 0)──▶ Terminated
//!                                  ▲    │
//!                                  └────┘ click on a successor → visit_state
//! ```
//!
//! One engine per trial. State changes go through `visit_state`,
//! `set_reward(s)` and `set_score`; the scene is re-presented after each.

pub mod input;
pub mod listeners;
pub mod hover;
mod navigate;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::info_span;

use crate::config::TrialConfig;
use crate::graph::Graph;
use crate::layout::Layout;
use crate::logger::EventLog;
use crate::model::{StateId, TrialRecord, TrialState, TrialSummary};
use crate::render::{CurrentOptions, Mount, Scene, SceneSpec};
use crate::{Error, Result};

pub use hover::{HoverGate, HOVER_NUDGE_AFTER};
pub use input::{Input, InputEvent, InputHandle};
pub use listeners::{CancelHandle, ListenerId, ListenerKind};
pub use navigate::{ClickOptions, NavigateOptions, Termination};

use listeners::Listeners;

/// Pause after an accepted step before the next click can land.
pub const STEP_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    AwaitingInput,
    Terminated,
}

/// Options for [`CircleGraph::set_current_state`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentStateOptions {
    pub show_current_edges: bool,
}

impl Default for CurrentStateOptions {
    fn default() -> Self {
        Self { show_current_edges: true }
    }
}

/// Restaging data for an engine that is reused across scripted steps.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrialPatch {
    pub start: StateId,
    #[serde(alias = "reward")]
    pub rewards: Vec<f64>,
    #[serde(default)]
    pub n_steps: Option<i64>,
}

type VisitHook = Box<dyn FnMut(StateId) + Send>;

// ============================================================================
// CircleGraph
// ============================================================================

pub struct CircleGraph<M: Mount> {
    config: TrialConfig,
    layout: Layout,
    scene: Scene,
    mount: M,
    state: TrialState,
    log: EventLog,
    input_tx: InputHandle,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
    listeners: Arc<Listeners>,
    hover_listener: Option<ListenerId>,
    hover_gate: Option<HoverGate>,
    on_state_visit: Option<VisitHook>,
    phase: Phase,
    span: tracing::Span,
}

impl<M: Mount> CircleGraph<M> {
    /// Build the layout and scene and attach them to `mount`. Does not
    /// start navigation.
    pub fn new(config: TrialConfig, mount: M) -> Result<Self> {
        config.validate()?;
        let render = &config.render;
        let layout = Layout::compute(
            &config.graph,
            render.width,
            render.height,
            render.scale_edge_factor,
            render.fixed_xy.as_deref(),
        )?;

        let mut rewards = config.rewards.clone();
        if config.consume {
            // Nothing to collect where the participant already stands.
            rewards[config.start.index()] = 0.0;
        }

        let mut scene = Scene::build(SceneSpec {
            graph: &config.graph,
            layout: &layout,
            icons: rewards.iter().map(|r| config.icon_for(*r)).collect(),
            goal: config.goal,
            probe: config.probe,
            show_points: config.show_points,
            show_steps: config.show_steps,
        });
        scene.header.steps = config.n_steps;

        let state = TrialState {
            current: None,
            rewards,
            score: 0.0,
            steps_left: config.n_steps,
            goal: config.goal,
            consume: config.consume,
        };
        let span = info_span!("trial", start = %config.start, states = config.graph.len());
        let (input_tx, input_rx) = input::channel();
        let start = config.start;

        let mut engine = Self {
            config,
            layout,
            scene,
            mount,
            state,
            log: EventLog::new(),
            input_tx,
            input_rx,
            listeners: Arc::new(Listeners::default()),
            hover_listener: None,
            hover_gate: None,
            on_state_visit: None,
            phase: Phase::Constructed,
            span,
        };
        engine.set_current_state(Some(start), CurrentStateOptions::default())?;
        Ok(engine)
    }

    /// Hook called on every non-initial visit.
    pub fn with_on_state_visit(mut self, hook: impl FnMut(StateId) + Send + 'static) -> Self {
        self.on_state_visit = Some(Box::new(hook));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn input(&self) -> InputHandle {
        self.input_tx.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { listeners: Arc::clone(&self.listeners) }
    }

    pub fn config(&self) -> &TrialConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.config.graph
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Scene access for scripted staging (messages, cues).
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn mount(&self) -> &M {
        &self.mount
    }

    pub fn trial_state(&self) -> &TrialState {
        &self.state
    }

    pub fn current_state(&self) -> Option<StateId> {
        self.state.current
    }

    pub fn rewards(&self) -> &[f64] {
        &self.state.rewards
    }

    pub fn score(&self) -> f64 {
        self.state.score
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Append to the trial's event log (for scripted flows).
    pub fn log_event(&mut self, event: &str, info: serde_json::Value) {
        self.log.log(event, info);
    }

    /// Listeners currently attached.
    pub fn pending_listeners(&self) -> usize {
        self.listeners.len()
    }

    fn check_state(&self, state: StateId) -> Result<()> {
        if self.config.graph.contains(state) {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "state {state} is not in a graph of {} states",
                self.config.graph.len()
            )))
        }
    }

    // ========================================================================
    // State operations
    // ========================================================================

    /// Move the current state and its highlight. `None` clears all
    /// highlighting.
    pub fn set_current_state(&mut self, state: Option<StateId>, options: CurrentStateOptions) -> Result<()> {
        if let Some(s) = state {
            self.check_state(s)?;
        }
        self.state.current = state;
        self.scene.set_current(
            &self.config.graph,
            state,
            CurrentOptions {
                show_current_edges: options.show_current_edges,
                only_show_current_edges: self.config.render.only_show_current_edges,
            },
        );
        self.render();
        Ok(())
    }

    /// Enter `state`. Non-initial visits collect its reward (consuming it
    /// if configured) and fire the visit hook.
    pub fn visit_state(&mut self, state: StateId, initial: bool) -> Result<()> {
        self.check_state(state)?;
        self.log.log("visit", json!({"state": state, "initial": initial}));

        if !initial {
            let reward = self.state.reward(state);
            self.add_score(reward, state);
            if self.state.consume {
                self.state.rewards[state.index()] = 0.0;
                self.scene.set_icon(state, None);
            }
            if let Some(hook) = self.on_state_visit.as_mut() {
                hook(state);
            }
        }
        if let Some(node) = self.scene.node_mut(state) {
            node.visited = true;
        }
        self.set_current_state(Some(state), CurrentStateOptions::default())
    }

    /// Add points with a transient "+N"/"-N" pop over `state`.
    pub fn add_score(&mut self, points: f64, state: StateId) {
        if points == 0.0 {
            return;
        }
        let now = self.log.elapsed();
        self.scene.push_pop(state, points, now);
        self.set_score(self.state.score + points);
    }

    pub fn set_score(&mut self, score: f64) {
        self.state.score = score;
        self.scene.header.points = score;
        self.render();
    }

    pub fn set_reward(&mut self, state: StateId, reward: f64) -> Result<()> {
        self.check_state(state)?;
        self.state.rewards[state.index()] = reward;
        let icon = self.config.icon_for(reward);
        self.scene.set_icon(state, icon);
        self.render();
        Ok(())
    }

    /// Replace every reward. The current state's entry is forced to zero.
    pub fn set_rewards(&mut self, rewards: &[f64]) -> Result<()> {
        if rewards.len() != self.config.graph.len() {
            return Err(Error::Precondition(format!(
                "reward vector has {} entries for {} states",
                rewards.len(),
                self.config.graph.len()
            )));
        }
        for (i, reward) in rewards.iter().enumerate() {
            let s = StateId(i);
            let value = if Some(s) == self.state.current { 0.0 } else { *reward };
            self.state.rewards[i] = value;
            let icon = self.config.icon_for(value);
            self.scene.set_icon(s, icon);
        }
        self.render();
        Ok(())
    }

    /// Restage: new start, rewards and optionally step budget.
    pub fn load_trial(&mut self, patch: TrialPatch) -> Result<()> {
        self.set_current_state(Some(patch.start), CurrentStateOptions::default())?;
        self.set_rewards(&patch.rewards)?;
        if patch.n_steps.is_some() {
            self.config.n_steps = crate::model::StepBudget::from_config(patch.n_steps);
            self.state.steps_left = self.config.n_steps;
            self.scene.header.steps = self.config.n_steps;
            self.render();
        }
        Ok(())
    }

    /// Tear down every pending input listener. The operation in progress
    /// (a wait, a pause, or a whole `navigate`) fails with
    /// `Error::Cancelled`, even if the cancel lands between two waits.
    pub fn cancel(&self) {
        self.listeners.cancel_all();
    }

    // ========================================================================
    // Presentation
    // ========================================================================

    fn render(&mut self) {
        self.scene.expire_pops(self.log.elapsed());
        self.mount.present(&self.scene);
    }

    /// Re-present the scene, e.g. after `scene_mut()` edits.
    pub fn refresh(&mut self) {
        self.render();
    }

    /// Clear the mount and hand back the completion record with the mount.
    pub fn finish(mut self) -> (TrialRecord, M) {
        self.listeners.cancel_all();
        self.mount.clear();
        self.phase = Phase::Terminated;
        let record = TrialRecord {
            events: self.log.into_events(),
            trial: TrialSummary {
                practice: self.config.practice,
                start: Some(self.config.start),
                reward: self.config.rewards,
            },
        };
        (record, self.mount)
    }

    /// Tear down a trial that did not complete: cancel every listener,
    /// clear the mount and hand it back. No record is produced.
    pub fn abort(mut self) -> M {
        self.listeners.cancel_all();
        self.mount.clear();
        self.phase = Phase::Terminated;
        tracing::warn!(parent: &self.span, events = self.log.len(), "trial aborted");
        self.mount
    }
}

impl<M: Mount> std::fmt::Debug for CircleGraph<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircleGraph")
            .field("phase", &self.phase)
            .field("state", &self.state)
            .field("events", &self.log.len())
            .finish_non_exhaustive()
    }
}
