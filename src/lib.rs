//! # circle-graph-nav — Graph Navigation Trials
//!
//! A participant moves a token around a small directed graph drawn on a
//! circle, collecting or losing points at each visited state. This crate
//! is the headless core: graph model, layout, the trial engine, the event
//! log, the bonus calculator, and the orchestration around them.
//!
//! ## Design Principles
//!
//! 1. **Headless**: the engine renders a [`Scene`] onto a [`Mount`]; how it
//!    reaches a screen is the mount's business
//! 2. **Input is a queue**: clicks, hovers and keys are timestamped events
//!    on a channel, so paused-clock tests drive a trial deterministically
//! 3. **Cancellable waits**: every pending wait is a listener that
//!    [`CancelHandle::cancel`] tears down in one call
//! 4. **Config is layered**: defaults < block options < trial overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use circle_graph_nav::{CircleGraph, MemoryMount, NavigateOptions, StateId, TrialConfig, TrialSpec};
//!
//! # async fn example() -> circle_graph_nav::Result<()> {
//! let spec = TrialSpec::from_json(r#"{
//!     "graph": [[1, 2], [3], [3], [0]],
//!     "reward": [0, 2, -1, 5],
//!     "start": 0,
//!     "goal": 3
//! }"#)?;
//! let mut cg = CircleGraph::new(TrialConfig::from_spec(spec)?, MemoryMount::new())?;
//!
//! let input = cg.input();
//! tokio::spawn(async move {
//!     for state in [1, 3] {
//!         tokio::time::sleep(Duration::from_millis(500)).await;
//!         input.click(StateId(state));
//!     }
//! });
//! cg.navigate(NavigateOptions::default()).await?;
//! assert_eq!(cg.score(), 7.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`graph`] | Adjacency lists, successor queries, BFS |
//! | [`layout`] | Circle or fixed embedding scaled into a viewport |
//! | [`render`] | Scene projection and mounts |
//! | [`engine`] | The per-trial state machine and navigation loop |
//! | [`logger`] | Timestamped event log |
//! | [`bonus`] | Points to payment conversion |
//! | [`config`] | Layered trial and experiment configuration |
//! | [`sequence`] | Scripted instruction trials |
//! | [`session`] | Trial sequencing, sinks and the error boundary |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod layout;
pub mod render;
pub mod engine;
pub mod logger;
pub mod bonus;
pub mod config;
pub mod sequence;
pub mod session;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{EventLogEntry, StateId, StepBudget, TrialRecord, TrialState, TrialSummary};

// ============================================================================
// Re-exports: Graph, layout, rendering
// ============================================================================

pub use graph::{BfsOptions, Graph};
pub use layout::{Layout, Point};
pub use render::{MemoryMount, Mount, Scene};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use engine::{
    CancelHandle, CircleGraph, ClickOptions, Input, InputHandle,
    NavigateOptions, Phase, Termination, TrialPatch,
};
pub use logger::EventLog;
pub use bonus::{Bonus, BonusConfig, FloorPolicy};

// ============================================================================
// Re-exports: Configuration and orchestration
// ============================================================================

pub use config::{ExperimentConfig, OptionLayer, Timeline, TimelineEntry, TrialConfig, TrialSpec};
pub use sequence::{Sequencer, Step};
pub use session::{ErrorReport, MemorySink, Session, TrialSink};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("No path from {start} to {goal}")]
    NoPath { start: StateId, goal: StateId },

    #[error("Trial cancelled")]
    Cancelled,

    #[error("Input source closed")]
    InputClosed,

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Malformed input data, as opposed to a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidGraph(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
