//! # Trial Data Model
//!
//! Plain data shared by the graph, the engine and the orchestration
//! boundary. No I/O, no async.

pub mod state;
pub mod event;

pub use state::{StateId, StepBudget, TrialState};
pub use event::{EventLogEntry, TrialRecord, TrialSummary};
