//! # Layout Engine
//!
//! Maps states to pixel positions inside a `width × height` viewport and
//! derives edge geometry.
//!
//! Two coordinate sets are produced:
//!
//! | Set | Used for |
//! |-----|----------|
//! | `coordinate` | node placement (node centers) |
//! | `scaled` | edge anchors, pulled toward the viewport center by `scale_edge_factor` |
//!
//! A `Layout` is immutable. Any change of render options or embedding
//! means computing a new one.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::model::StateId;
use crate::{Error, Result};

/// Rendered node box edge length in pixels. Positions are bounded so a
/// node is never cropped by the viewport.
pub const NODE_SIZE: f64 = 100.0;

/// A 2D point. Serializes as `[x, y]` to match `fixedXY` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Length and rotation of a line segment anchored at its start point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeGeometry {
    pub length: f64,
    /// `atan2` angle from start to end, radians.
    pub angle: f64,
}

impl EdgeGeometry {
    pub fn between(from: Point, to: Point) -> Self {
        Self {
            length: from.distance(to),
            angle: (to.y - from.y).atan2(to.x - from.x),
        }
    }
}

/// Default circular embedding in `[-1, 1]²`: state 0 at the top, the rest
/// clockwise at equal angular spacing.
pub fn circle_xy(n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / n as f64;
            Point::new(theta.sin(), -theta.cos())
        })
        .collect()
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    width: f64,
    height: f64,
    scale_edge_factor: f64,
    coordinate: Vec<Point>,
    scaled: Vec<Point>,
}

impl Layout {
    /// Fit `fixed` into the viewport, preserving aspect ratio, and center it.
    ///
    /// `fixed` needs one point per graph state; `None` uses [`circle_xy`].
    pub fn compute(
        graph: &Graph,
        width: f64,
        height: f64,
        scale_edge_factor: f64,
        fixed: Option<&[Point]>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&scale_edge_factor) {
            return Err(Error::Precondition(format!(
                "scale_edge_factor must be in [0, 1], got {scale_edge_factor}"
            )));
        }

        let circle;
        let fixed = match fixed {
            Some(points) => points,
            None => {
                circle = circle_xy(graph.len());
                &circle
            }
        };
        if fixed.len() < graph.len() {
            return Err(Error::Configuration(format!(
                "fixedXY has {} points for {} states",
                fixed.len(),
                graph.len()
            )));
        }
        let fixed = &fixed[..graph.len()];

        let width_no_margin = width - NODE_SIZE;
        let height_no_margin = height - NODE_SIZE;

        let (min_x, max_x) = bounds(fixed.iter().map(|p| p.x));
        let (min_y, max_y) = bounds(fixed.iter().map(|p| p.y));
        let range_x = max_x - min_x;
        let range_y = max_y - min_y;

        // Compare the embedding's aspect ratio to the viewport's to decide
        // which axis limits the scale. A flat axis imposes no limit.
        let scale = match (range_x > 0.0, range_y > 0.0) {
            (true, true) => {
                if range_x / range_y > width_no_margin / height_no_margin {
                    width_no_margin / range_x
                } else {
                    height_no_margin / range_y
                }
            }
            (true, false) => width_no_margin / range_x,
            (false, true) => height_no_margin / range_y,
            (false, false) => 1.0,
        };

        let margin_x = (width - range_x * scale) / 2.0;
        let margin_y = (height - range_y * scale) / 2.0;

        let coordinate: Vec<Point> = fixed
            .iter()
            .map(|p| Point::new((p.x - min_x) * scale + margin_x, (p.y - min_y) * scale + margin_y))
            .collect();

        let (cx, cy) = (width / 2.0, height / 2.0);
        let scaled = coordinate
            .iter()
            .map(|p| {
                Point::new(
                    (p.x - cx) * scale_edge_factor + cx,
                    (p.y - cy) * scale_edge_factor + cy,
                )
            })
            .collect();

        Ok(Self { width, height, scale_edge_factor, coordinate, scaled })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn scale_edge_factor(&self) -> f64 {
        self.scale_edge_factor
    }

    /// Node center for `state`.
    pub fn coordinate(&self, state: StateId) -> Point {
        self.coordinate[state.index()]
    }

    /// Edge anchor for `state`.
    pub fn scaled(&self, state: StateId) -> Point {
        self.scaled[state.index()]
    }

    pub fn coordinates(&self) -> &[Point] {
        &self.coordinate
    }

    pub fn scaled_coordinates(&self) -> &[Point] {
        &self.scaled
    }

    pub fn edge(&self, state: StateId, successor: StateId) -> EdgeGeometry {
        EdgeGeometry::between(self.scaled(state), self.scaled(successor))
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
