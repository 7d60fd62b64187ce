//! # Render Layer
//!
//! A retained, headless view tree (`Scene`) that mirrors what the
//! participant sees. It is a pure projection: every field here is derived
//! from engine state and is rewritten by the engine, never read back as
//! truth.
//!
//! The scene is handed to a [`Mount`] after each change. The mount is the
//! caller-supplied container the trial owns for its duration.
//!
//! | Mount | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryMount` | `mount` | Keeps the latest frame, for tests and embedding |

pub mod mount;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::graph::Graph;
use crate::layout::{EdgeGeometry, Layout, Point, NODE_SIZE};
use crate::model::{StateId, StepBudget};

pub use mount::{Mount, MemoryMount};

/// How long a "+N" / "-N" score pop stays on screen.
pub const POP_DURATION: Duration = Duration::from_millis(1000);

// ============================================================================
// View nodes
// ============================================================================

/// One rendered state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub state: StateId,
    /// Top-left translate of the node box.
    pub origin: Point,
    pub icon: Option<String>,
    pub current: bool,
    pub goal: bool,
    pub probe: bool,
    /// Currently a valid click target.
    pub selectable: bool,
    /// Revealed by hover while the scene hides states.
    pub revealed: bool,
    pub visited: bool,
}

/// One rendered undirected edge, anchored at `from` and rotated toward `to`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeView {
    pub from: StateId,
    pub to: StateId,
    pub anchor: Point,
    pub geometry: EdgeGeometry,
    pub current: bool,
    pub revealed: bool,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopKind {
    Win,
    Loss,
}

/// Transient score delta shown over a state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorePop {
    pub state: StateId,
    pub text: String,
    pub kind: PopKind,
    /// Trial-relative instant after which the pop is gone.
    pub expires_at: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub points: f64,
    pub show_points: bool,
    pub steps: StepBudget,
    pub show_steps: bool,
}

/// Static inputs for building a scene.
#[derive(Debug, Clone)]
pub struct SceneSpec<'a> {
    pub graph: &'a Graph,
    pub layout: &'a Layout,
    pub icons: Vec<Option<String>>,
    pub goal: Option<StateId>,
    pub probe: Option<StateId>,
    pub show_points: bool,
    pub show_steps: bool,
}

/// Options for [`Scene::set_current`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentOptions {
    /// Highlight edges to the current state's successors.
    pub show_current_edges: bool,
    /// Hide every other edge instead of merely not highlighting it.
    pub only_show_current_edges: bool,
}

impl Default for CurrentOptions {
    fn default() -> Self {
        Self { show_current_edges: true, only_show_current_edges: false }
    }
}

// ============================================================================
// Scene
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    /// Lookup from `(a, b)`, `a < b`, into `edges`.
    #[serde(skip)]
    edge_index: BTreeMap<(StateId, StateId), usize>,
    pub header: Header,
    pub pops: Vec<ScorePop>,
    /// Hover-reveal mode for rewards.
    pub hide_states: bool,
    /// Hover-reveal mode for edges.
    pub hide_edges: bool,
    pub message: Option<String>,
    pub button: Option<String>,
    pub faded: bool,
    /// False once the graph itself has been cleared from the container.
    pub graph_visible: bool,
}

impl Scene {
    pub fn build(spec: SceneSpec<'_>) -> Self {
        let SceneSpec { graph, layout, icons, goal, probe, show_points, show_steps } = spec;
        let half = NODE_SIZE / 2.0;

        let nodes = graph
            .states()
            .map(|s| {
                let c = layout.coordinate(s);
                NodeView {
                    state: s,
                    origin: Point::new(c.x - half, c.y - half),
                    icon: icons.get(s.index()).cloned().flatten(),
                    current: false,
                    goal: goal == Some(s),
                    probe: probe == Some(s),
                    selectable: false,
                    revealed: false,
                    visited: false,
                }
            })
            .collect();

        let mut edges = Vec::new();
        let mut edge_index = BTreeMap::new();
        for (a, b) in graph.edge_pairs() {
            edge_index.insert((a, b), edges.len());
            edges.push(EdgeView {
                from: a,
                to: b,
                anchor: layout.scaled(a),
                geometry: layout.edge(a, b),
                current: false,
                revealed: false,
                opacity: 1.0,
            });
        }

        Self {
            width: layout.width(),
            height: layout.height(),
            nodes,
            edges,
            edge_index,
            header: Header { points: 0.0, show_points, steps: StepBudget::Unbounded, show_steps },
            pops: Vec::new(),
            hide_states: false,
            hide_edges: false,
            message: None,
            button: None,
            faded: false,
            graph_visible: true,
        }
    }

    pub fn node(&self, state: StateId) -> Option<&NodeView> {
        self.nodes.get(state.index())
    }

    pub fn node_mut(&mut self, state: StateId) -> Option<&mut NodeView> {
        self.nodes.get_mut(state.index())
    }

    /// The edge shared by `a` and `b`, whichever direction is asked for.
    pub fn edge(&self, a: StateId, b: StateId) -> Option<&EdgeView> {
        let key = if a < b { (a, b) } else { (b, a) };
        self.edge_index.get(&key).map(|i| &self.edges[*i])
    }

    pub fn edge_mut(&mut self, a: StateId, b: StateId) -> Option<&mut EdgeView> {
        let key = if a < b { (a, b) } else { (b, a) };
        self.edge_index.get(&key).map(|i| &mut self.edges[*i])
    }

    pub fn current(&self) -> Option<StateId> {
        self.nodes.iter().find(|n| n.current).map(|n| n.state)
    }

    /// Move the "current" highlight. `None` clears all highlighting.
    pub fn set_current(&mut self, graph: &Graph, state: Option<StateId>, options: CurrentOptions) {
        for n in &mut self.nodes {
            n.current = false;
        }
        self.clear_current_edges();

        let Some(state) = state else { return };
        if let Some(n) = self.node_mut(state) {
            n.current = true;
        }
        if !options.show_current_edges {
            return;
        }
        if options.only_show_current_edges {
            for e in &mut self.edges {
                e.opacity = 0.0;
            }
        }
        for succ in graph.successors(state) {
            if let Some(e) = self.edge_mut(state, *succ) {
                e.current = true;
                if options.only_show_current_edges {
                    e.opacity = 1.0;
                }
            }
        }
    }

    /// Move the goal marker. `None` marks no node.
    pub fn set_goal(&mut self, goal: Option<StateId>) {
        for n in &mut self.nodes {
            n.goal = Some(n.state) == goal;
        }
    }

    pub fn clear_current_edges(&mut self) {
        for e in &mut self.edges {
            e.current = false;
        }
    }

    /// Mark every state outside `invalid` as clickable.
    pub fn set_selectable(&mut self, is_invalid: impl Fn(StateId) -> bool) {
        for n in &mut self.nodes {
            n.selectable = !is_invalid(n.state);
        }
    }

    pub fn clear_selectable(&mut self) {
        for n in &mut self.nodes {
            n.selectable = false;
        }
    }

    pub fn set_icon(&mut self, state: StateId, icon: Option<String>) {
        if let Some(n) = self.node_mut(state) {
            n.icon = icon;
        }
    }

    /// Hover reveal of a state and the edges to its successors.
    pub fn set_revealed(&mut self, graph: &Graph, state: StateId, revealed: bool) {
        if let Some(n) = self.node_mut(state) {
            n.revealed = revealed;
        }
        for succ in graph.successors(state) {
            if let Some(e) = self.edge_mut(state, *succ) {
                e.revealed = revealed;
            }
        }
    }

    /// Whether a participant can currently see the reward icon of `state`.
    pub fn reward_visible(&self, state: StateId) -> bool {
        self.node(state)
            .map(|n| n.icon.is_some() && (!self.hide_states || n.revealed || n.current))
            .unwrap_or(false)
    }

    pub fn push_pop(&mut self, state: StateId, points: f64, now: Duration) {
        let (kind, sign) = if points < 0.0 { (PopKind::Loss, "") } else { (PopKind::Win, "+") };
        self.pops.push(ScorePop {
            state,
            text: format!("{sign}{}", format_points(points)),
            kind,
            expires_at: now + POP_DURATION,
        });
    }

    /// Drop pops whose display time has passed.
    pub fn expire_pops(&mut self, now: Duration) {
        self.pops.retain(|p| p.expires_at > now);
    }

    /// Remove the graph from the container, keeping header and controls.
    pub fn clear_graph(&mut self) {
        self.graph_visible = false;
        self.pops.clear();
    }
}

/// Integral point values print without a fractional part.
pub fn format_points(points: f64) -> String {
    if points.fract() == 0.0 && points.abs() < 1e15 {
        format!("{}", points as i64)
    } else {
        format!("{points}")
    }
}
