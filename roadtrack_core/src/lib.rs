//! roadtrack core — hybrid on-road / off-road vehicle state estimation.
//!
//! Tracks vehicles moving over a street graph from noisy GPS observations.
//! For each observation the estimator maintains a Gaussian belief about the
//! vehicle's location — free on the plane (4-D state) or constrained to an
//! edge of the road network (2-D along-path state) — together with a
//! distribution over the path travelled since the previous observation.
//! The same generative model drives a trajectory sampler, so simulated
//! vehicles and inferred ones share one set of assumptions.
//!
//! The moving parts:
//! 1. **Graph view** (`graph`): edge geometry, adjacency, nearby-edge queries
//! 2. **Hybrid filter** (`filter`): two linear-Gaussian filters plus the
//!    ground↔road projection operators that weld them together
//! 3. **Path model** (`path`): along-path coordinate frames and contiguous
//!    edge sequences
//! 4. **Edge transitions** (`transition`): when vehicles enter/leave the
//!    network, with Dirichlet learning
//! 5. **Vehicle state** (`state`): the per-observation bundle and its
//!    conditional log-density
//! 6. **Trajectory sampler** (`sampler`): seeded generative forward steps

pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod observation;
pub mod path;
pub mod sampler;
pub mod state;
pub mod transition;

// Re-export key types for convenience
pub use config::InitialParameters;
pub use error::TrackError;
pub use filter::{Belief, GroundBelief, RoadBelief, RoadTrackingFilter};
pub use graph::{EdgeId, InferredEdge, RoadGraph};
pub use observation::{Observation, ObservationFactory};
pub use path::{InferredPath, PathEdge};
pub use sampler::TrajectorySampler;
pub use state::{DensityContext, PositionEstimate, VehicleState};
pub use transition::EdgeTransitionDistribution;
