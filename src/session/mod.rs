//! # Session Orchestration
//!
//! Drives trials one after another and hands each completion record to a
//! [`TrialSink`]. The sink is the boundary to whatever stores the data
//! (a file, a remote collector, memory in tests).
//!
//! ```text
//! run_trial:  script | navigate ─▶ 500ms ─▶ clear graph ─▶ [continue] ─▶ finish ─▶ sink
//!                                                                              └─▶ bonus (main rounds)
//! ```
//!
//! Every trial runs inside [`Session::guard`]: an error is reported to the
//! sink as an [`ErrorReport`] and then returned to the caller unchanged.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::bonus::Bonus;
use crate::config::{BlockKind, Timeline, TimelineEntry, TrialConfig};
use crate::engine::{CircleGraph, NavigateOptions};
use crate::model::TrialRecord;
use crate::render::Mount;
use crate::sequence::Sequencer;
use crate::Result;

/// Pause between the end of navigation and the continue screen.
pub const END_OF_TRIAL_PAUSE: Duration = Duration::from_millis(500);

/// A failed trial, as reported to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    pub detail: String,
    pub trial: Option<String>,
    pub at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(err: &crate::Error, trial: Option<&str>) -> Self {
        Self {
            message: err.to_string(),
            detail: format!("{err:?}"),
            trial: trial.map(str::to_string),
            at: Utc::now(),
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Where completed trials and errors go.
#[async_trait]
pub trait TrialSink: Send + Sync {
    async fn finish_trial(&self, trial: &str, record: &TrialRecord) -> Result<()>;

    async fn record_error(&self, report: &ErrorReport) -> Result<()>;
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    trials: RwLock<Vec<(String, TrialRecord)>>,
    errors: RwLock<Vec<ErrorReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> Vec<(String, TrialRecord)> {
        self.trials.read().clone()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        self.errors.read().clone()
    }

    pub fn trial_count(&self) -> usize {
        self.trials.read().len()
    }
}

#[async_trait]
impl TrialSink for MemorySink {
    async fn finish_trial(&self, trial: &str, record: &TrialRecord) -> Result<()> {
        self.trials.write().push((trial.to_string(), record.clone()));
        Ok(())
    }

    async fn record_error(&self, report: &ErrorReport) -> Result<()> {
        self.errors.write().push(report.clone());
        Ok(())
    }
}

#[async_trait]
impl<S: TrialSink + ?Sized> TrialSink for std::sync::Arc<S> {
    async fn finish_trial(&self, trial: &str, record: &TrialRecord) -> Result<()> {
        (**self).finish_trial(trial, record).await
    }

    async fn record_error(&self, report: &ErrorReport) -> Result<()> {
        (**self).record_error(report).await
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session<S: TrialSink> {
    sink: S,
    bonus: Bonus,
    scripts: BTreeMap<String, Sequencer>,
    completed: usize,
}

impl<S: TrialSink> Session<S> {
    pub fn new(sink: S, bonus: Bonus) -> Self {
        Self { sink, bonus, scripts: BTreeMap::new(), completed: 0 }
    }

    /// Run `script` instead of a plain navigation for trials named `name`.
    pub fn with_script(mut self, name: impl Into<String>, script: Sequencer) -> Self {
        self.scripts.insert(name.into(), script);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn bonus(&self) -> &Bonus {
        &self.bonus
    }

    /// Trials finished so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Run one trial to completion and hand its record to the sink.
    /// A `bonused` trial adds its score to the session bonus.
    pub async fn run_trial<M: Mount>(
        &mut self,
        name: &str,
        cg: CircleGraph<M>,
        bonused: bool,
    ) -> Result<(TrialRecord, M)> {
        let outcome = self.play(name, cg, bonused).await;
        self.guard(name, outcome).await
    }

    async fn play<M: Mount>(
        &mut self,
        name: &str,
        mut cg: CircleGraph<M>,
        bonused: bool,
    ) -> Result<(TrialRecord, M)> {
        if let Err(e) = self.drive(name, &mut cg).await {
            cg.abort();
            return Err(e);
        }

        let score = cg.score();
        let (record, mount) = cg.finish();
        self.sink.finish_trial(name, &record).await?;
        if bonused {
            self.bonus.add_points(score);
        }
        self.completed += 1;
        info!(trial = name, score, bonused, bonus = self.bonus.points(), "trial complete");
        Ok((record, mount))
    }

    /// Everything between the first frame and the continue button.
    async fn drive<M: Mount>(&self, name: &str, cg: &mut CircleGraph<M>) -> Result<()> {
        match self.scripts.get(name) {
            Some(script) => script.run(cg).await?,
            None => cg.navigate(NavigateOptions::default()).await?,
        }
        cg.pause(END_OF_TRIAL_PAUSE).await?;
        cg.scene_mut().clear_graph();
        cg.wait_for_button("continue").await
    }

    /// Run every trial of `timeline` in order. `build` turns each resolved
    /// configuration into an engine.
    pub async fn run_timeline<M, F>(&mut self, timeline: Timeline, mut build: F) -> Result<Vec<TrialRecord>>
    where
        M: Mount,
        F: FnMut(&str, TrialConfig) -> Result<CircleGraph<M>>,
    {
        let total = timeline.total_trials();
        let mut records = Vec::with_capacity(total);
        info!(entries = timeline.len(), trials = total, "timeline started");

        for entry in timeline {
            match entry {
                TimelineEntry::Trial { name, layer, trial } => {
                    let config = TrialConfig::resolve(trial, &[&layer]);
                    let cg = self.guard(&name, config.and_then(|c| build(&name, c))).await?;
                    let (record, _) = self.run_trial(&name, cg, false).await?;
                    records.push(record);
                }
                TimelineEntry::Block { name, kind, layer, message, trials } => {
                    let bonused = kind == BlockKind::Main;
                    for (i, trial) in trials.into_iter().enumerate() {
                        let config = TrialConfig::resolve(trial, &[&layer]);
                        let mut cg = self.guard(&name, config.and_then(|c| build(&name, c))).await?;
                        if i == 0 && message.is_some() {
                            cg.scene_mut().message = message.clone();
                            cg.refresh();
                        }
                        let (record, _) = self.run_trial(&name, cg, bonused).await?;
                        records.push(record);
                    }
                }
            }
        }
        info!(trials = records.len(), bonus = self.bonus.points(), "timeline finished");
        Ok(records)
    }

    /// Error boundary: report a failure to the sink, then return it.
    /// A failing report is logged and otherwise ignored.
    pub async fn guard<T>(&self, trial: &str, outcome: Result<T>) -> Result<T> {
        if let Err(err) = &outcome {
            error!(trial, error = %err, "trial failed");
            let report = ErrorReport::new(err, Some(trial));
            if let Err(sink_err) = self.sink.record_error(&report).await {
                warn!(trial, error = %sink_err, "could not record trial error");
            }
        }
        outcome
    }
}

impl<S: TrialSink> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("bonus", &self.bonus)
            .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}
