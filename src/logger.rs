//! Trial event log.
//!
//! Append-only, timestamped relative to when the log (and so the trial
//! engine) was created. Entries are never edited or removed.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::model::EventLogEntry;

#[derive(Debug)]
pub struct EventLog {
    started: Instant,
    events: Vec<EventLogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self { started, events: Vec::new() }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time since the log started.
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.started)
    }

    /// Append an event stamped now.
    pub fn log(&mut self, event: &str, info: Value) {
        self.log_at(Instant::now(), event, info);
    }

    /// Append an event that happened at `at`.
    ///
    /// Times never go backwards within one log: a stamp older than the last
    /// entry is recorded at the last entry's time.
    pub fn log_at(&mut self, at: Instant, event: &str, info: Value) {
        let raw = at.saturating_duration_since(self.started).as_millis() as u64;
        let time = self.events.last().map_or(raw, |last| raw.max(last.time));
        let info = match info {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        debug!(event, time, ?info, "trial event");
        self.events.push(EventLogEntry { time, event: event.to_string(), info });
    }

    pub fn events(&self) -> &[EventLogEntry] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<EventLogEntry> {
        self.events
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
