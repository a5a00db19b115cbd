//! Path edges and inferred paths.
//!
//! A path edge pins a graph edge to an along-path coordinate frame: `d0` is
//! the signed distance from the path origin to the edge's start vertex. An
//! inferred path is an ordered, contiguous run of path edges travelled in a
//! single direction; the sign of the `d0` sequence encodes that direction.

use std::sync::Arc;

use crate::error::TrackError;
use crate::filter::RoadBelief;
use crate::graph::{InferredEdge, RoadGraph};

/// Tolerance for along-path coordinate comparisons, metres.
const COORD_EPS: f64 = 1e-6;

/// An edge positioned in a path's along-path frame, or the off-road marker.
#[derive(Debug, Clone, PartialEq)]
pub enum PathEdge {
    /// Off the road network. No along-path coordinate applies.
    Empty,

    /// On `edge`, whose start vertex sits at signed along-path distance
    /// `distance_to_start` from the path origin.
    OnEdge {
        edge: Arc<InferredEdge>,
        distance_to_start: f64,
    },
}

impl PathEdge {
    pub fn new(edge: Arc<InferredEdge>, distance_to_start: f64) -> Self {
        Self::OnEdge {
            edge,
            distance_to_start,
        }
    }

    pub fn empty() -> Self {
        Self::Empty
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn edge(&self) -> Option<&Arc<InferredEdge>> {
        match self {
            Self::Empty => None,
            Self::OnEdge { edge, .. } => Some(edge),
        }
    }

    pub fn distance_to_start(&self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::OnEdge {
                distance_to_start, ..
            } => Some(*distance_to_start),
        }
    }

    /// Edge length, or zero off-road.
    pub fn length(&self) -> f64 {
        self.edge().map(|e| e.length).unwrap_or(0.0)
    }

    /// Direction of travel across this edge: the sign of `d0`, falling back
    /// to the sign of the supplied along-path coordinate when `d0` is zero
    /// (the first edge of a path). Ties resolve forward.
    pub fn direction_hint(&self, coordinate: f64) -> f64 {
        match self.distance_to_start() {
            Some(d0) if d0 != 0.0 => d0.signum(),
            _ => {
                if coordinate < 0.0 {
                    -1.0
                } else {
                    1.0
                }
            }
        }
    }

    /// The along-path interval this edge covers: `[d0, d0+len]` travelling
    /// forward, `[d0-len, d0]` backward. `None` off-road.
    pub fn interval(&self, coordinate: f64) -> Option<(f64, f64)> {
        let d0 = self.distance_to_start()?;
        let length = self.length();
        if self.direction_hint(coordinate) < 0.0 {
            Some((d0 - length, d0))
        } else {
            Some((d0, d0 + length))
        }
    }

    /// True when the along-path coordinate falls on this edge.
    pub fn contains(&self, coordinate: f64) -> bool {
        self.interval(coordinate)
            .is_some_and(|(lo, hi)| coordinate >= lo - COORD_EPS && coordinate <= hi + COORD_EPS)
    }

    /// Arc position on the edge geometry for an along-path coordinate,
    /// clamped to the edge extent.
    pub fn arc_position(&self, coordinate: f64) -> Option<f64> {
        let d0 = self.distance_to_start()?;
        let length = self.length();
        let raw = if self.direction_hint(coordinate) < 0.0 {
            coordinate - d0 + length
        } else {
            coordinate - d0
        };
        Some(raw.clamp(0.0, length))
    }

    /// Inverse of [`arc_position`](Self::arc_position): the along-path
    /// coordinate of a given arc position, for the given travel direction.
    pub fn path_distance(&self, arc: f64, direction: f64) -> Option<f64> {
        let d0 = self.distance_to_start()?;
        if direction < 0.0 {
            Some(d0 + arc - self.length())
        } else {
            Some(d0 + arc)
        }
    }

    /// Conditions a road belief on "the vehicle is somewhere on this edge".
    ///
    /// Rank-1 update against a coarse uniform-on-interval measurement of the
    /// along-path position: `S = Σ₀₀ + (len/√12)²`, gain `W = Σ·H'/S`,
    /// innovation toward the interval midpoint. Off-road this is a no-op.
    ///
    /// TODO: replace with a truncated-Gaussian moment match; this update
    /// does not clip mass outside the interval.
    pub fn predict(&self, belief: &mut RoadBelief) {
        let Some((lo, hi)) = self.interval(belief.mean[0]) else {
            return;
        };
        let length = hi - lo;
        let s_var = belief.covariance[(0, 0)] + (length / 12.0_f64.sqrt()).powi(2);
        let gain = belief.covariance.column(0).into_owned() / s_var;
        let innovation = (lo + length / 2.0) - belief.mean[0];
        belief.mean += gain * innovation;
        belief.covariance -= gain * gain.transpose() * s_var;
    }
}

impl std::fmt::Display for PathEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "(off-road)"),
            Self::OnEdge {
                edge,
                distance_to_start,
            } => write!(f, "({} @ {distance_to_start:.1})", edge.id),
        }
    }
}

/// Ordered, contiguous sequence of path edges travelled in one direction.
///
/// Immutable once constructed. An empty path (no edges) represents
/// off-road motion.
#[derive(Debug, Clone)]
pub struct InferredPath {
    edges: Vec<PathEdge>,
    total_distance: Option<f64>,
}

impl InferredPath {
    /// The empty, off-road path.
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            total_distance: None,
        }
    }

    /// A one-edge path starting at the path origin.
    pub fn single(edge: PathEdge) -> Result<Self, TrackError> {
        if let Some(d0) = edge.distance_to_start() {
            if d0.abs() > COORD_EPS {
                return Err(TrackError::graph(format!(
                    "single-edge path must start at the origin, got d0={d0}"
                )));
            }
        }
        Ok(Self {
            edges: vec![edge],
            total_distance: None,
        })
    }

    /// Builds a path, validating the adjacency and direction invariants
    /// against the graph:
    ///
    /// - the off-road marker may only terminate a path;
    /// - the first edge starts at the path origin (`d0 = 0`);
    /// - consecutive edges are adjacent in the graph (or equal);
    /// - each `d0` step equals the previous edge's length, with one
    ///   consistent sign for the whole path.
    pub fn new(
        edges: Vec<PathEdge>,
        total_distance: Option<f64>,
        graph: &RoadGraph,
    ) -> Result<Self, TrackError> {
        for (i, pe) in edges.iter().enumerate() {
            if pe.is_empty() && i + 1 != edges.len() {
                return Err(TrackError::graph(
                    "off-road marker may only terminate a path",
                ));
            }
        }
        if let Some(first) = edges.first() {
            if let Some(d0) = first.distance_to_start() {
                if d0.abs() > COORD_EPS {
                    return Err(TrackError::graph(format!(
                        "path must start at the origin, got d0={d0}"
                    )));
                }
            }
        }

        let mut direction = 0.0;
        for pair in edges.windows(2) {
            let (PathEdge::OnEdge { edge: a, distance_to_start: d0_a }, PathEdge::OnEdge { edge: b, distance_to_start: d0_b }) =
                (&pair[0], &pair[1])
            else {
                continue;
            };
            if a.id != b.id && !graph.is_adjacent(a.id, b.id) {
                return Err(TrackError::graph(format!(
                    "edges {} and {} are not adjacent",
                    a.id, b.id
                )));
            }
            let step = d0_b - d0_a;
            if (step.abs() - a.length).abs() > COORD_EPS {
                return Err(TrackError::graph(format!(
                    "d0 step {step} does not match edge {} length {}",
                    a.id, a.length
                )));
            }
            if direction == 0.0 {
                direction = step.signum();
            } else if step.signum() != direction {
                return Err(TrackError::graph(
                    "path reverses direction mid-traversal",
                ));
            }
        }

        Ok(Self {
            edges,
            total_distance,
        })
    }

    pub fn edges(&self) -> &[PathEdge] {
        &self.edges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathEdge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True for the off-road path.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn first(&self) -> Option<&PathEdge> {
        self.edges.first()
    }

    pub fn last(&self) -> Option<&PathEdge> {
        self.edges.last()
    }

    /// Signed distance actually travelled along this path, when known.
    pub fn total_distance(&self) -> Option<f64> {
        self.total_distance
    }

    /// The path edge whose along-path interval covers `coordinate`.
    pub fn edge_containing(&self, coordinate: f64) -> Option<&PathEdge> {
        self.edges.iter().find(|pe| pe.contains(coordinate))
    }
}

impl PartialEq for InferredPath {
    /// Paths compare by their edge id sequences and offsets; the travelled
    /// distance is derived bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.edges == other.edges
    }
}
