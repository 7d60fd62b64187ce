//! Trial event log entries and the completion record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StateId;

/// One entry of a trial's append-only event trace.
///
/// Serializes flat: `{"time": 812, "event": "visit", "state": 3, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Milliseconds since the trial engine was constructed.
    pub time: u64,
    pub event: String,
    #[serde(flatten)]
    pub info: Map<String, Value>,
}

impl EventLogEntry {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.info.get(key)
    }

    /// The `state` payload field, if present.
    pub fn state(&self) -> Option<StateId> {
        self.info
            .get("state")
            .and_then(Value::as_u64)
            .map(|s| StateId(s as usize))
    }
}

/// Static trial fields echoed into the completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub practice: bool,
    pub start: Option<StateId>,
    pub reward: Vec<f64>,
}

/// What a finished trial hands to the orchestration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub events: Vec<EventLogEntry>,
    pub trial: TrialSummary,
}

impl TrialRecord {
    /// Events with the given name, in log order.
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EventLogEntry> + 'a {
        self.events.iter().filter(move |e| e.event == name)
    }
}
