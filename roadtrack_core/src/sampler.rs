//! Trajectory sampler.
//!
//! Generative forward step shared by the simulator and proposal
//! distributions: sample a path by walking edges, predicting the belief
//! across each transfer, then sample an observation of the final state. All
//! randomness flows through one seeded ChaCha8 stream, so a fixed seed
//! reproduces trajectories bit-for-bit.

use std::sync::Arc;

use nalgebra::{Cholesky, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::TrackError;
use crate::filter::{Belief, RoadTrackingFilter};
use crate::graph::{InferredEdge, RoadGraph};
use crate::path::{InferredPath, PathEdge};
use crate::transition::EdgeTransitionDistribution;

/// Default search radius for nearby-edge queries, metres.
const DEFAULT_NEARBY_RADIUS: f64 = 200.0;

pub struct TrajectorySampler {
    rng: ChaCha8Rng,

    /// Search radius for nearby-edge queries when off the network, metres.
    pub nearby_radius: f64,
}

impl TrajectorySampler {
    /// Seed zero requests OS entropy; any other value is reproducible.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(seed)
        };
        Self {
            rng,
            nearby_radius: DEFAULT_NEARBY_RADIUS,
        }
    }

    pub fn with_nearby_radius(mut self, radius: f64) -> Self {
        self.nearby_radius = radius;
        self
    }

    /// Samples one path from `start`, mutating `belief` into the posterior
    /// at the path's end (in the path frame).
    ///
    /// The walk commits an intended travel distance on the first transfer —
    /// noise drawn through the covariance factor, so the rank-deficient
    /// joint never has to be sampled directly — then crosses edges until the
    /// distance is spent, the transition distribution leaves the network, or
    /// a dead end clamps the motion.
    pub fn traverse_edge(
        &mut self,
        transition: &EdgeTransitionDistribution,
        belief: &mut Belief,
        start: &PathEdge,
        filter: &RoadTrackingFilter,
        graph: &RoadGraph,
        dt: f64,
    ) -> Result<InferredPath, TrackError> {
        let mut current = start.clone();
        let mut path: Vec<PathEdge> = Vec::new();
        let mut dist_traveled = 0.0_f64;
        let mut total: Option<f64> = None;
        let mut dir = 1.0_f64;

        loop {
            // The committed distance is spent once it no longer reaches past
            // the current edge.
            if let Some(t) = total {
                let covered =
                    current.distance_to_start().map(f64::abs).unwrap_or(0.0) + current.length();
                if t.abs() < covered {
                    break;
                }
            }

            let transfer: Vec<Arc<InferredEdge>> = if current.is_empty() {
                let ground = belief.as_ground().ok_or_else(|| {
                    TrackError::graph("off-road traversal requires a ground belief")
                })?;
                graph.nearby_edges(&ground.position(), self.nearby_radius)
            } else if total.is_none() {
                // No direction committed yet: the only candidate is the edge
                // we are standing on.
                current.edge().cloned().map(|e| vec![e]).unwrap_or_default()
            } else {
                let id = current.edge().map(|e| e.id).ok_or_else(|| {
                    TrackError::graph("committed traversal lost its current edge")
                })?;
                let s = belief.as_road().map(|r| r.mean[0]).unwrap_or(0.0);
                if s < 0.0 {
                    graph.incoming(id)
                } else if s > 0.0 {
                    graph.outgoing(id)
                } else {
                    graph.neighbours(id)
                }
            };

            // Dead end: clamp to the edge extremity, kill the motion, stop.
            if transfer.is_empty() && !current.is_empty() && total.is_some() {
                if let Some(road) = belief.as_road_mut() {
                    let d0 = current.distance_to_start().unwrap_or(0.0);
                    road.mean[0] = d0 + dir * current.length();
                    road.mean[1] = 0.0;
                    total = Some(road.mean[0]);
                }
                break;
            }

            let Some(sampled) = transition.sample(&mut self.rng, &transfer, &current) else {
                // Off-road outcome: predict off-edge and finish.
                let old = if current.is_empty() {
                    None
                } else {
                    Some(&current)
                };
                filter.predict(belief, dt, &PathEdge::empty(), old)?;
                if path.is_empty() {
                    return Ok(InferredPath::empty());
                }
                path.push(PathEdge::empty());
                return InferredPath::new(path, total, graph);
            };

            if let Some(curr_edge) = current.edge() {
                if total.is_some() && !graph.is_adjacent(curr_edge.id, sampled.id) {
                    return Err(TrackError::graph(format!(
                        "sampled transfer edge {} is not adjacent to {}",
                        sampled.id, curr_edge.id
                    )));
                }
            }

            let sampled_pe = PathEdge::new(sampled.clone(), dist_traveled);

            if total.is_none() {
                // First transfer: commit the travel distance.
                if let Belief::Ground(ground) = &*belief {
                    let constrained = filter.project_onto_edge(ground, &sampled_pe)?;
                    *belief = Belief::Road(constrained);
                }
                // Predict with the along-path origin pinned to the current
                // location, then restore the offset so s stays absolute in
                // the path frame.
                let current_loc = {
                    let road = belief.as_road_mut().ok_or_else(|| {
                        TrackError::graph("traversal belief must be on-road after projection")
                    })?;
                    let loc = road.mean[0];
                    road.mean[0] = 0.0;
                    loc
                };
                filter.predict(belief, dt, &sampled_pe, None)?;
                if let Some(road) = belief.as_road_mut() {
                    road.mean[0] += current_loc;
                }
                self.sample_movement_belief(belief, filter, dt);
                total = belief.as_road().map(|r| r.mean[0]);
            }

            let s = belief.as_road().map(|r| r.mean[0]).unwrap_or(0.0);
            dir = if s < 0.0 { -1.0 } else { 1.0 };
            dist_traveled += dir * sampled.length;
            path.push(sampled_pe.clone());
            current = sampled_pe;
        }

        let total = total.or_else(|| belief.as_road().map(|r| r.mean[0]));
        InferredPath::new(path, total, graph)
    }

    /// Adds state noise to the belief mean, drawn through the covariance
    /// factor Γ so the noise respects the position/velocity coupling.
    pub fn sample_movement_belief(
        &mut self,
        belief: &mut Belief,
        filter: &RoadTrackingFilter,
        dt: f64,
    ) {
        match belief {
            Belief::Road(road) => {
                let gamma = RoadTrackingFilter::road_covariance_factor(dt);
                let n: f64 = self.rng.sample(StandardNormal);
                road.mean += gamma * (filter.on_road_variance.sqrt() * n);
            }
            Belief::Ground(ground) => {
                let gamma = RoadTrackingFilter::ground_covariance_factor(dt);
                let nx: f64 = self.rng.sample(StandardNormal);
                let ny: f64 = self.rng.sample(StandardNormal);
                let noise = Vector2::new(
                    filter.off_road_variance[0].sqrt() * nx,
                    filter.off_road_variance[1].sqrt() * ny,
                );
                ground.mean += gamma * noise;
            }
        }
    }

    /// Samples a planar observation of the belief: project to ground
    /// through `path_edge`, take the observed components, add noise with
    /// covariance R via its Cholesky factor.
    pub fn sample_observation(
        &mut self,
        belief: &Belief,
        path_edge: &PathEdge,
        filter: &RoadTrackingFilter,
    ) -> Result<Vector2<f64>, TrackError> {
        let ground = match belief {
            Belief::Ground(g) => g.clone(),
            Belief::Road(r) => filter.invert_projection(r, path_edge)?,
        };
        let mean = RoadTrackingFilter::ground_observation_matrix() * ground.mean;
        let chol = Cholesky::new(filter.obs_covariance)
            .ok_or_else(|| TrackError::numeric("observation covariance is not PSD"))?;
        let nx: f64 = self.rng.sample(StandardNormal);
        let ny: f64 = self.rng.sample(StandardNormal);
        Ok(mean + chol.l() * Vector2::new(nx, ny))
    }
}
