//! Vehicle state.
//!
//! A `VehicleState` bundles the posterior belief after one observation with
//! the edge it sits on, the path travelled since the parent state, and the
//! per-vehicle transition posterior. States form a chain through weak parent
//! back-references: children never prolong an ancestor's lifetime, since
//! chains grow with every observation.

use std::sync::{Arc, Weak};

use nalgebra::Vector2;

use crate::config::InitialParameters;
use crate::error::TrackError;
use crate::filter::{Belief, RoadTrackingFilter};
use crate::graph::InferredEdge;
use crate::observation::Observation;
use crate::path::{InferredPath, PathEdge};
use crate::transition::EdgeTransitionDistribution;

/// Conditioning context for [`VehicleState::log_density`].
#[derive(Debug, Clone)]
pub struct DensityContext<'a> {
    /// Path edge the parent state ended on.
    pub prev_edge: &'a PathEdge,

    /// Size of the discrete destination set admissible from the parent:
    /// nearby edges when entering the network, the transfer set when
    /// staying on it.
    pub choices: usize,

    /// Planar observation being scored.
    pub observation: Vector2<f64>,
}

/// Best-state position summary: ground-projected mean and the principal
/// axes of the 95 % confidence ellipse (1.98 σ scaling).
#[derive(Debug, Clone)]
pub struct PositionEstimate {
    pub mean: Vector2<f64>,
    pub major_axis: Vector2<f64>,
    pub minor_axis: Vector2<f64>,
}

/// One vehicle's tracked state after one observation.
///
/// Invariants: off the network the belief is 4-D and the path is empty; on
/// the network the belief is 2-D and local to `edge`, and the path's last
/// entry is `edge`.
#[derive(Debug)]
pub struct VehicleState {
    /// Shared filter; holds configuration-derived matrices only.
    pub filter: Arc<RoadTrackingFilter>,

    /// Posterior belief, edge-local when on the network.
    pub belief: Belief,

    /// Current edge in the state's local frame (`d0 = 0`), or the off-road
    /// marker.
    pub edge: PathEdge,

    /// Path travelled since the parent state. Empty off the network.
    pub path: InferredPath,

    /// Per-vehicle transition posterior.
    pub transition: EdgeTransitionDistribution,

    /// Observation that produced this state.
    pub observation: Arc<Observation>,

    /// Time step that produced this state, seconds.
    pub time_delta: f64,

    /// Along-path offset subtracted when re-zeroing the belief to the
    /// current edge.
    pub dist_from_prev: f64,

    parent: Weak<VehicleState>,
}

impl VehicleState {
    /// Initial state from an observation, optionally snapped to an edge.
    ///
    /// The belief is centred on the observation (ground) or on the foot of
    /// the perpendicular (road), with zero velocity and observation-scaled
    /// covariance. The time step comes from the observation chain, falling
    /// back to `initial_time_diff` for a chain head.
    pub fn initial(
        filter: Arc<RoadTrackingFilter>,
        params: &InitialParameters,
        observation: Arc<Observation>,
        edge: Option<Arc<InferredEdge>>,
    ) -> Result<Arc<Self>, TrackError> {
        let time_delta = observation.time_delta(params.initial_time_diff);
        let transition = EdgeTransitionDistribution::new(params);
        let state = match edge {
            None => Self {
                belief: Belief::Ground(filter.initial_ground_belief(&observation.projected)),
                filter,
                edge: PathEdge::empty(),
                path: InferredPath::empty(),
                transition,
                observation,
                time_delta,
                dist_from_prev: 0.0,
                parent: Weak::new(),
            },
            Some(e) => {
                let (arc, _) = e.project(&observation.projected);
                let pe = PathEdge::new(e, 0.0);
                let belief = Belief::Road(filter.initial_road_belief(arc, &pe)?);
                let path = InferredPath::single(pe.clone())?;
                Self {
                    filter,
                    belief,
                    edge: pe,
                    path,
                    transition,
                    observation,
                    time_delta,
                    dist_from_prev: 0.0,
                    parent: Weak::new(),
                }
            }
        };
        Ok(Arc::new(state))
    }

    /// Successor state after traversing `path` under a new observation.
    ///
    /// The supplied belief is in the traversal's path frame. The current
    /// edge is the path's last entry; its `d0` is subtracted from the
    /// belief's along-path coordinate so the stored belief is edge-local,
    /// and the subtracted offset is recorded in `dist_from_prev`. Off the
    /// network no path is carried.
    pub fn transition_from(
        parent: &Arc<VehicleState>,
        mut belief: Belief,
        path: InferredPath,
        observation: Arc<Observation>,
        transition: EdgeTransitionDistribution,
    ) -> Result<Arc<Self>, TrackError> {
        let time_delta = observation.timestamp - parent.observation.timestamp;
        if time_delta <= 0.0 {
            return Err(TrackError::TimeOrder {
                previous: parent.observation.timestamp,
                observed: observation.timestamp,
            });
        }

        let current = match path.last() {
            None | Some(PathEdge::Empty) => PathEdge::empty(),
            Some(pe) => pe.clone(),
        };

        let (edge_local, stored_path, dist_from_prev) = match &current {
            PathEdge::Empty => {
                if !matches!(belief, Belief::Ground(_)) {
                    return Err(TrackError::graph(
                        "belief regime does not match the traversed path",
                    ));
                }
                (PathEdge::empty(), InferredPath::empty(), 0.0)
            }
            PathEdge::OnEdge {
                edge,
                distance_to_start,
            } => {
                let road = belief.as_road_mut().ok_or_else(|| {
                    TrackError::graph("belief regime does not match the traversed path")
                })?;
                road.mean[0] -= *distance_to_start;
                (
                    PathEdge::new(edge.clone(), 0.0),
                    path,
                    *distance_to_start,
                )
            }
        };

        Ok(Arc::new(Self {
            filter: parent.filter.clone(),
            belief,
            edge: edge_local,
            path: stored_path,
            transition,
            observation,
            time_delta,
            dist_from_prev,
            parent: Arc::downgrade(parent),
        }))
    }

    /// Conditional log-density `p(observation, path | parent)`: the
    /// edge-transition prior plus the measurement log-likelihood. The motion
    /// prior is already absorbed into the predicted belief.
    pub fn log_density(&self, context: &DensityContext<'_>) -> Result<f64, TrackError> {
        let prior = self
            .transition
            .log_evaluate(context.prev_edge, &self.edge, context.choices);
        let likelihood =
            self.filter
                .log_likelihood(&context.observation, &self.belief, &self.edge)?;
        Ok(prior + likelihood)
    }

    /// Sampling a vehicle state as a distribution over its conditional
    /// parameters is unsupported; generation goes through the trajectory
    /// sampler.
    pub fn sample(&self) -> Result<Vector2<f64>, TrackError> {
        Err(TrackError::NotImplemented(
            "sampling a vehicle state as a distribution",
        ))
    }

    /// Ground-projected mean plus the 95 % confidence-ellipse axes, for
    /// rendering callers.
    pub fn position_estimate(&self) -> Result<PositionEstimate, TrackError> {
        let ground = match &self.belief {
            Belief::Ground(g) => g.clone(),
            Belief::Road(r) => self.filter.invert_projection(r, &self.edge)?,
        };
        let eigen = ground.position_covariance().symmetric_eigen();
        let (hi, lo) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
            (0, 1)
        } else {
            (1, 0)
        };
        let axis = |i: usize| {
            let v: Vector2<f64> = eigen.eigenvectors.column(i).into_owned();
            v * (1.98 * eigen.eigenvalues[i].max(0.0).sqrt())
        };
        Ok(PositionEstimate {
            mean: ground.position(),
            major_axis: axis(hi),
            minor_axis: axis(lo),
        })
    }

    /// Parent state, while something else still keeps it alive.
    pub fn parent(&self) -> Option<Arc<VehicleState>> {
        self.parent.upgrade()
    }
}
