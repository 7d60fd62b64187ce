//! Experiment timeline: an ordered list of single trials and one-level
//! blocks of trials.

use serde_json::Value;

use super::{OptionLayer, TrialSpec};
use crate::{Error, Result};

/// What a block counts toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Practice,
    /// Scores are added to the session bonus.
    Main,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Trial {
        name: String,
        layer: OptionLayer,
        trial: TrialSpec,
    },
    Block {
        name: String,
        kind: BlockKind,
        layer: OptionLayer,
        /// Shown before the first trial of the block.
        message: Option<String>,
        trials: Vec<TrialSpec>,
    },
}

impl TimelineEntry {
    /// Build a block from raw JSON: either one trial object or a list of
    /// them. Sub-entries may not nest further.
    pub fn block(
        name: &str,
        kind: BlockKind,
        layer: OptionLayer,
        message: Option<String>,
        raw: &Value,
    ) -> Result<Self> {
        let items: Vec<Value> = match raw {
            Value::Array(items) => items.clone(),
            single => vec![single.clone()],
        };
        check_flat(name, &items)?;
        let trials = items
            .into_iter()
            .map(TrialSpec::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Block { name: name.to_string(), kind, layer, message, trials })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Trial { name, .. } | Self::Block { name, .. } => name,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Trial { .. } => 1,
            Self::Block { trials, .. } => trials.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bonused(&self) -> bool {
        matches!(self, Self::Block { kind: BlockKind::Main, .. })
    }
}

/// Reject sub-entries that would make a block recursive.
fn check_flat(name: &str, items: &[Value]) -> Result<()> {
    for (i, item) in items.iter().enumerate() {
        if let Some(obj) = item.as_object() {
            for key in ["timeline", "type"] {
                if obj.contains_key(key) {
                    return Err(Error::Configuration(format!(
                        "block {name}: entry {i} has `{key}`; nested timelines are not allowed"
                    )));
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Timeline
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new(entries: Vec<TimelineEntry>) -> Self {
        Self { entries }
    }

    /// Parse a raw JSON array where each entry is a trial object, or an
    /// object with a `timeline` list of trial objects.
    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::Configuration("timeline must be an array".into()))?;
        let mut entries = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("entry{i}"), str::to_string);
            match item.get("timeline") {
                Some(sub) => {
                    let layer: OptionLayer = serde_json::from_value(item.clone()).map_err(|e| {
                        Error::Configuration(format!("block {name}: invalid options: {e}"))
                    })?;
                    let kind = if item.get("bonus").and_then(Value::as_bool).unwrap_or(false) {
                        BlockKind::Main
                    } else {
                        BlockKind::Practice
                    };
                    let message = item.get("message").and_then(Value::as_str).map(str::to_string);
                    if !sub.is_array() {
                        return Err(Error::Configuration(format!("block {name}: timeline must be an array")));
                    }
                    entries.push(TimelineEntry::block(&name, kind, layer, message, sub)?);
                }
                None => entries.push(TimelineEntry::Trial {
                    name,
                    layer: OptionLayer::default(),
                    trial: TrialSpec::from_value(item.clone())?,
                }),
            }
        }
        Ok(Self { entries })
    }

    pub fn push(&mut self, entry: TimelineEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trials across all entries, for progress accounting.
    pub fn total_trials(&self) -> usize {
        self.entries.iter().map(TimelineEntry::len).sum()
    }

    /// Drop entries before the first one named `name`.
    pub fn start_at(&mut self, name: &str) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.name() == name)
            .ok_or_else(|| Error::Configuration(format!("timeline has no entry named {name}")))?;
        self.entries.drain(..pos);
        Ok(())
    }
}

impl IntoIterator for Timeline {
    type Item = TimelineEntry;
    type IntoIter = std::vec::IntoIter<TimelineEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
