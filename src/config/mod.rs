//! # Trial Configuration
//!
//! Typed configuration with explicit precedence:
//!
//! ```text
//! base defaults  <  per-block options  <  per-trial overrides
//! ExperimentParams   OptionLayer           TrialSpec.options
//! ```
//!
//! Every presentation knob is an `Option` in an [`OptionLayer`]; layers are
//! overlaid in order, and [`TrialConfig::resolve`] fills whatever is still
//! unset from the built-in defaults.

pub mod timeline;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bonus::BonusConfig;
use crate::graph::Graph;
use crate::layout::Point;
use crate::model::{StateId, StepBudget};
use crate::render::format_points;
use crate::{Error, Result};

pub use timeline::{BlockKind, Timeline, TimelineEntry};

/// Reward value (as written in JSON, e.g. `"-1"`) → icon asset.
pub type RewardIcons = BTreeMap<String, String>;

// ============================================================================
// Render options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRenderOptions {
    #[serde(default = "default_extent")]
    pub width: f64,
    #[serde(default = "default_extent")]
    pub height: f64,
    #[serde(rename = "scaleEdgeFactor", default = "default_scale_edge_factor")]
    pub scale_edge_factor: f64,
    /// Embedding in roughly `[-1, 1]²`; a circle when absent.
    #[serde(rename = "fixedXY", default, skip_serializing_if = "Option::is_none")]
    pub fixed_xy: Option<Vec<Point>>,
    #[serde(rename = "onlyShowCurrentEdges", default)]
    pub only_show_current_edges: bool,
}

fn default_extent() -> f64 {
    600.0
}

fn default_scale_edge_factor() -> f64 {
    0.95
}

impl Default for GraphRenderOptions {
    fn default() -> Self {
        Self {
            width: default_extent(),
            height: default_extent(),
            scale_edge_factor: default_scale_edge_factor(),
            fixed_xy: None,
            only_show_current_edges: false,
        }
    }
}

// ============================================================================
// Option layers
// ============================================================================

/// A partial set of trial options. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consume: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_steps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_steps: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_points: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_edges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_rewards: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice: Option<bool>,
    #[serde(
        rename = "rewardGraphics",
        alias = "rewardIcons",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reward_icons: Option<RewardIcons>,
    #[serde(rename = "graphRenderOptions", default, skip_serializing_if = "Option::is_none")]
    pub graph_render_options: Option<GraphRenderOptions>,
}

impl OptionLayer {
    /// `top` wins wherever it sets a field.
    pub fn overlay(self, top: &OptionLayer) -> OptionLayer {
        OptionLayer {
            consume: top.consume.or(self.consume),
            n_steps: top.n_steps.or(self.n_steps),
            show_steps: top.show_steps.or(self.show_steps),
            show_points: top.show_points.or(self.show_points),
            hover_edges: top.hover_edges.or(self.hover_edges),
            hover_rewards: top.hover_rewards.or(self.hover_rewards),
            practice: top.practice.or(self.practice),
            reward_icons: top.reward_icons.clone().or(self.reward_icons),
            graph_render_options: top.graph_render_options.clone().or(self.graph_render_options),
        }
    }
}

// ============================================================================
// Trial specification (input)
// ============================================================================

/// One trial as it appears in configuration JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSpec {
    pub graph: Graph,
    #[serde(rename = "reward", alias = "rewards", default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Vec<f64>>,
    pub start: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<StateId>,
    #[serde(flatten)]
    pub options: OptionLayer,
}

impl TrialSpec {
    pub fn new(graph: Graph, start: StateId) -> Self {
        Self { graph, rewards: None, start, goal: None, probe: None, options: OptionLayer::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid trial specification: {e}")))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Configuration(format!("invalid trial specification: {e}")))
    }
}

// ============================================================================
// Resolved configuration (what the engine consumes)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    pub graph: Graph,
    pub rewards: Vec<f64>,
    pub reward_icons: RewardIcons,
    pub start: StateId,
    pub goal: Option<StateId>,
    pub probe: Option<StateId>,
    pub n_steps: StepBudget,
    pub consume: bool,
    pub show_steps: bool,
    pub show_points: bool,
    pub hover_edges: bool,
    pub hover_rewards: bool,
    pub practice: bool,
    pub render: GraphRenderOptions,
}

impl TrialConfig {
    /// Resolve a trial against lower-precedence layers, lowest first.
    pub fn resolve(spec: TrialSpec, layers: &[&OptionLayer]) -> Result<Self> {
        let merged = layers
            .iter()
            .fold(OptionLayer::default(), |acc, layer| acc.overlay(layer))
            .overlay(&spec.options);

        let n = spec.graph.len();
        let rewards = spec.rewards.unwrap_or_else(|| vec![0.0; n]);
        let n_steps = StepBudget::from_config(merged.n_steps);

        let config = Self {
            graph: spec.graph,
            rewards,
            reward_icons: merged.reward_icons.unwrap_or_default(),
            start: spec.start,
            goal: spec.goal,
            probe: spec.probe,
            n_steps,
            consume: merged.consume.unwrap_or(true),
            show_steps: merged.show_steps.unwrap_or(n_steps.is_bounded()),
            show_points: merged.show_points.unwrap_or(true),
            hover_edges: merged.hover_edges.unwrap_or(false),
            hover_rewards: merged.hover_rewards.unwrap_or(false),
            practice: merged.practice.unwrap_or(false),
            render: merged.graph_render_options.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_spec(spec: TrialSpec) -> Result<Self> {
        Self::resolve(spec, &[])
    }

    /// Check that every referenced state exists and the reward vector fits.
    pub fn validate(&self) -> Result<()> {
        let n = self.graph.len();
        if n == 0 {
            return Err(Error::Configuration("graph has no states".into()));
        }
        let named = [("start", Some(self.start)), ("goal", self.goal), ("probe", self.probe)];
        for (field, state) in named {
            if let Some(s) = state {
                if !self.graph.contains(s) {
                    return Err(Error::Configuration(format!(
                        "{field} state {s} is not in a graph of {n} states"
                    )));
                }
            }
        }
        if self.rewards.len() != n {
            return Err(Error::Configuration(format!(
                "reward vector has {} entries for {n} states",
                self.rewards.len()
            )));
        }
        Ok(())
    }

    /// Icon for a reward value. Unmapped values and empty assets have none.
    pub fn icon_for(&self, reward: f64) -> Option<String> {
        self.reward_icons
            .get(&format_points(reward))
            .filter(|icon| !icon.is_empty())
            .cloned()
    }
}

// ============================================================================
// Experiment-wide parameters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentParams {
    pub hover_edges: bool,
    pub hover_rewards: bool,
    pub points_per_cent: f64,
    pub show_points: bool,
    pub use_n_steps: bool,
    pub vary_transition: bool,
    #[serde(rename = "rewardGraphics", alias = "rewardIcons")]
    pub reward_icons: RewardIcons,
    #[serde(rename = "graphRenderOptions")]
    pub graph_render_options: GraphRenderOptions,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            hover_edges: true,
            hover_rewards: true,
            points_per_cent: 2.0,
            show_points: false,
            use_n_steps: false,
            vary_transition: true,
            reward_icons: RewardIcons::new(),
            graph_render_options: GraphRenderOptions {
                scale_edge_factor: 1.0,
                ..GraphRenderOptions::default()
            },
        }
    }
}

impl ExperimentParams {
    /// The lowest-precedence layer every block starts from.
    pub fn base_layer(&self) -> OptionLayer {
        OptionLayer {
            show_points: Some(self.show_points),
            hover_edges: Some(self.hover_edges),
            hover_rewards: Some(self.hover_rewards),
            reward_icons: Some(self.reward_icons.clone()),
            graph_render_options: Some(self.graph_render_options.clone()),
            ..OptionLayer::default()
        }
    }
}

/// Initial stake granted with the bonus, in points.
pub const INITIAL_BONUS_POINTS: f64 = 50.0;

/// A whole experiment file: parameters plus named trials or trial lists.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub parameters: ExperimentParams,
    pub trials: BTreeMap<String, Value>,
}

impl ExperimentConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid experiment configuration: {e}")))
    }

    pub fn bonus_config(&self) -> BonusConfig {
        BonusConfig::new(self.parameters.points_per_cent, INITIAL_BONUS_POINTS)
    }

    fn named(&self, name: &str) -> Result<&Value> {
        self.trials
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("{name} not in config.trials")))
    }

    /// Hover reveal stays off in instruction and practice blocks unless
    /// explicitly enabled.
    fn block_layer(&self, enable_hover: bool) -> OptionLayer {
        let mut layer = self.parameters.base_layer();
        if !enable_hover {
            layer.hover_edges = Some(false);
            layer.hover_rewards = Some(false);
        }
        layer
    }

    /// A single scripted instruction trial.
    pub fn instruct_block(&self, name: &str, enable_hover: bool) -> Result<TimelineEntry> {
        let trial = TrialSpec::from_value(self.named(name)?.clone())?;
        Ok(TimelineEntry::Trial {
            name: name.to_string(),
            layer: self.block_layer(enable_hover),
            trial,
        })
    }

    /// Unbonused practice rounds with an introductory message.
    pub fn practice_block(&self, name: &str, message: &str, enable_hover: bool) -> Result<TimelineEntry> {
        TimelineEntry::block(
            name,
            BlockKind::Practice,
            self.block_layer(enable_hover),
            Some(message.trim().to_string()),
            self.named(name)?,
        )
    }

    /// Bonused rounds.
    pub fn main_block(&self, name: &str) -> Result<TimelineEntry> {
        TimelineEntry::block(name, BlockKind::Main, self.parameters.base_layer(), None, self.named(name)?)
    }

    /// Rounds that count toward the bonus: `main` plus `eyetracking`.
    pub fn bonused_rounds(&self) -> usize {
        ["main", "eyetracking"]
            .iter()
            .filter_map(|k| self.trials.get(*k))
            .map(|v| v.as_array().map_or(1, Vec::len))
            .sum()
    }
}
