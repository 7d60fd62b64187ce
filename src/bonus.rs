//! Bonus accounting: points to dollars.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What a negative point total pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorPolicy {
    /// Negative totals pay nothing.
    #[default]
    ClampAtZero,
    /// Negative totals convert to a negative amount.
    Unclamped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusConfig {
    pub points_per_cent: f64,
    /// Points granted up front.
    #[serde(default)]
    pub initial: f64,
    #[serde(default)]
    pub floor: FloorPolicy,
}

impl BonusConfig {
    pub fn new(points_per_cent: f64, initial: f64) -> Self {
        Self { points_per_cent, initial, floor: FloorPolicy::default() }
    }
}

/// Running bonus for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Bonus {
    config: BonusConfig,
    points: f64,
}

impl Bonus {
    pub fn new(config: BonusConfig) -> Result<Self> {
        if !(config.points_per_cent > 0.0) {
            return Err(Error::Configuration(format!(
                "points_per_cent must be positive, got {}",
                config.points_per_cent
            )));
        }
        let points = config.initial;
        Ok(Self { config, points })
    }

    pub fn config(&self) -> &BonusConfig {
        &self.config
    }

    pub fn initial(&self) -> f64 {
        self.config.initial
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn add_points(&mut self, points: f64) {
        self.points += points;
    }

    /// Human-readable payout rate, e.g. "one cent for every 2 points".
    pub fn describe_scheme(&self) -> String {
        let ppc = self.config.points_per_cent;
        if ppc == 1.0 {
            "one cent for every point".to_string()
        } else {
            format!("one cent for every {} points", crate::render::format_points(ppc))
        }
    }

    /// Payout for the current total.
    pub fn dollars(&self) -> f64 {
        self.dollars_for(self.points)
    }

    pub fn dollars_for(&self, points: f64) -> f64 {
        let points = match self.config.floor {
            FloorPolicy::ClampAtZero => points.max(0.0),
            FloorPolicy::Unclamped => points,
        };
        points / self.config.points_per_cent / 100.0
    }
}
