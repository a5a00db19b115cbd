//! The hybrid road-tracking filter.
//!
//! Two embedded linear-Gaussian filters share one observation model: a 4-D
//! constant-velocity filter for free motion on the plane, state
//! (x, ẋ, y, ẏ), and a 2-D along-path filter for motion constrained to an
//! edge, state (s, ṡ). Projection operators move beliefs between the two
//! frames through an edge's geometry; crossings between the regimes during
//! prediction trigger them automatically.

use std::f64::consts::PI;

use nalgebra::{Cholesky, Matrix2, Matrix2x4, Matrix4, Matrix4x2, RowVector2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::config::InitialParameters;
use crate::error::TrackError;
use crate::path::PathEdge;

/// Free-plane belief, state (x, ẋ, y, ẏ) in projected metres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundBelief {
    pub mean: Vector4<f64>,
    pub covariance: Matrix4<f64>,
}

impl GroundBelief {
    /// Planar position (x, y).
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.mean[0], self.mean[2])
    }

    /// Planar velocity (ẋ, ẏ).
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.mean[1], self.mean[3])
    }

    /// The 2×2 position block of the covariance.
    pub fn position_covariance(&self) -> Matrix2<f64> {
        Matrix2::new(
            self.covariance[(0, 0)],
            self.covariance[(0, 2)],
            self.covariance[(2, 0)],
            self.covariance[(2, 2)],
        )
    }
}

/// Along-path belief, state (s, ṡ): signed along-path distance and rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadBelief {
    pub mean: Vector2<f64>,
    pub covariance: Matrix2<f64>,
}

/// Posterior belief over a vehicle's motion state, discriminated by regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Belief {
    /// Free motion on the plane, 4-D state.
    Ground(GroundBelief),
    /// Motion constrained to a path, 2-D state.
    Road(RoadBelief),
}

impl Belief {
    /// State dimension: 4 on the ground, 2 on a road.
    pub fn dim(&self) -> usize {
        match self {
            Self::Ground(_) => 4,
            Self::Road(_) => 2,
        }
    }

    pub fn is_road(&self) -> bool {
        matches!(self, Self::Road(_))
    }

    pub fn as_ground(&self) -> Option<&GroundBelief> {
        match self {
            Self::Ground(g) => Some(g),
            Self::Road(_) => None,
        }
    }

    pub fn as_road(&self) -> Option<&RoadBelief> {
        match self {
            Self::Ground(_) => None,
            Self::Road(r) => Some(r),
        }
    }

    pub fn as_road_mut(&mut self) -> Option<&mut RoadBelief> {
        match self {
            Self::Ground(_) => None,
            Self::Road(r) => Some(r),
        }
    }
}

/// The hybrid filter. Holds only configuration-derived immutable data, so a
/// single instance is safely shareable across vehicles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadTrackingFilter {
    /// Observation covariance R = diag(obs_variance), m².
    pub obs_covariance: Matrix2<f64>,

    /// Along-edge acceleration variance, (m/s²)².
    pub on_road_variance: f64,

    /// Per-axis ground acceleration variance, (m/s²)².
    pub off_road_variance: Vector2<f64>,
}

impl RoadTrackingFilter {
    pub fn new(params: &InitialParameters) -> Result<Self, TrackError> {
        params.validate()?;
        Ok(Self {
            obs_covariance: Matrix2::new(params.obs_variance[0], 0.0, 0.0, params.obs_variance[1]),
            on_road_variance: params.on_road_state_variance,
            off_road_variance: Vector2::new(
                params.off_road_state_variance[0],
                params.off_road_state_variance[1],
            ),
        })
    }

    // ========================================================================
    // MODEL MATRICES
    // ========================================================================

    /// Ground transition F_g(Δt): constant velocity per axis.
    pub fn ground_transition(dt: f64) -> Matrix4<f64> {
        Matrix4::new(
            1.0, dt, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, dt, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Road transition F_r(Δt).
    pub fn road_transition(dt: f64) -> Matrix2<f64> {
        Matrix2::new(1.0, dt, 0.0, 1.0)
    }

    /// Ground covariance factor Γ_g(Δt): spreads per-axis acceleration noise
    /// onto (x, ẋ, y, ẏ).
    pub fn ground_covariance_factor(dt: f64) -> Matrix4x2<f64> {
        let half = dt * dt / 2.0;
        Matrix4x2::new(
            half, 0.0, //
            dt, 0.0, //
            0.0, half, //
            0.0, dt,
        )
    }

    /// Road covariance factor Γ_r(Δt).
    pub fn road_covariance_factor(dt: f64) -> Vector2<f64> {
        Vector2::new(dt * dt / 2.0, dt)
    }

    /// Ground observation matrix O_g: picks (x, y) out of the state.
    pub fn ground_observation_matrix() -> Matrix2x4<f64> {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        )
    }

    /// Road observation matrix O_r: picks s.
    pub fn road_observation_matrix() -> RowVector2<f64> {
        RowVector2::new(1.0, 0.0)
    }

    fn ground_process_noise(&self, dt: f64) -> Matrix4<f64> {
        let gamma = Self::ground_covariance_factor(dt);
        let sigma = Matrix2::new(self.off_road_variance[0], 0.0, 0.0, self.off_road_variance[1]);
        gamma * sigma * gamma.transpose()
    }

    fn road_process_noise(&self, dt: f64) -> Matrix2<f64> {
        let gamma = Self::road_covariance_factor(dt);
        gamma * self.on_road_variance * gamma.transpose()
    }

    // ========================================================================
    // INITIAL BELIEFS
    // ========================================================================

    /// Fresh ground belief centred on a planar position, zero velocity,
    /// observation-scaled covariance.
    pub fn initial_ground_belief(&self, position: &Vector2<f64>) -> GroundBelief {
        let rx = self.obs_covariance[(0, 0)];
        let ry = self.obs_covariance[(1, 1)];
        GroundBelief {
            mean: Vector4::new(position.x, 0.0, position.y, 0.0),
            covariance: Matrix4::from_diagonal(&Vector4::new(rx, rx, ry, ry)),
        }
    }

    /// Fresh road belief at along-path coordinate `s` on `path_edge`,
    /// zero rate, tangent-projected observation variance.
    pub fn initial_road_belief(&self, s: f64, path_edge: &PathEdge) -> Result<RoadBelief, TrackError> {
        let r = self.projected_obs_variance(path_edge, s)?;
        Ok(RoadBelief {
            mean: Vector2::new(s, 0.0),
            covariance: Matrix2::new(r, 0.0, 0.0, r),
        })
    }

    /// Observation variance seen through the edge tangent at along-path
    /// coordinate `s`: τᵀRτ.
    fn projected_obs_variance(&self, path_edge: &PathEdge, s: f64) -> Result<f64, TrackError> {
        let edge = path_edge
            .edge()
            .ok_or_else(|| TrackError::graph("tangent variance needs an on-road edge"))?;
        let arc = path_edge.arc_position(s).unwrap_or(0.0);
        let tau = edge.tangent_at(arc);
        Ok((tau.transpose() * self.obs_covariance * tau)[(0, 0)])
    }

    // ========================================================================
    // PREDICT / UPDATE / LIKELIHOOD
    // ========================================================================

    /// One motion-prediction step.
    ///
    /// The regime pair (previous edge → new edge) selects the model: ground
    /// when both are off-road, road when both are on-road (re-zeroing the
    /// along-path origin when the edge changes), and a projection when the
    /// regimes cross. `old_edge` of `None` means "same regime as the belief".
    pub fn predict(
        &self,
        belief: &mut Belief,
        dt: f64,
        new_edge: &PathEdge,
        old_edge: Option<&PathEdge>,
    ) -> Result<(), TrackError> {
        if !(dt > 0.0) {
            return Err(TrackError::numeric(format!("non-positive time delta {dt}")));
        }
        let was_on_road = old_edge.map(|pe| !pe.is_empty()).unwrap_or(belief.is_road());
        match (new_edge.is_empty(), was_on_road) {
            (true, false) => self.predict_ground(belief, dt),
            (true, true) => {
                let old = old_edge.ok_or_else(|| {
                    TrackError::graph("leaving the network requires the previous edge")
                })?;
                self.convert_to_ground_belief(belief, old)?;
                self.predict_ground(belief, dt)
            }
            (false, _) => {
                match belief {
                    Belief::Ground(ground) => {
                        let constrained = self.project_onto_edge(ground, new_edge)?;
                        *belief = Belief::Road(constrained);
                    }
                    Belief::Road(road) => {
                        if let Some(old) = old_edge {
                            if let (Some(old_e), Some(new_e)) = (old.edge(), new_edge.edge()) {
                                if old_e.id != new_e.id {
                                    // Shift the along-path origin so s is
                                    // zeroed at the new edge's start.
                                    let dir = if road.mean[0] < 0.0 { -1.0 } else { 1.0 };
                                    road.mean[0] -= dir * old_e.length;
                                }
                            }
                        }
                    }
                }
                self.predict_road(belief, dt)
            }
        }
    }

    fn predict_ground(&self, belief: &mut Belief, dt: f64) -> Result<(), TrackError> {
        let Belief::Ground(ground) = belief else {
            return Err(TrackError::graph("ground prediction on a road belief"));
        };
        let f = Self::ground_transition(dt);
        ground.mean = f * ground.mean;
        ground.covariance = f * ground.covariance * f.transpose() + self.ground_process_noise(dt);
        Ok(())
    }

    fn predict_road(&self, belief: &mut Belief, dt: f64) -> Result<(), TrackError> {
        let Belief::Road(road) = belief else {
            return Err(TrackError::graph("road prediction on a ground belief"));
        };
        let f = Self::road_transition(dt);
        road.mean = f * road.mean;
        road.covariance = f * road.covariance * f.transpose() + self.road_process_noise(dt);
        Ok(())
    }

    /// Standard Kalman measurement update with the planar observation `z`.
    ///
    /// Road beliefs first project `z` onto the edge: the measurement becomes
    /// the along-path coordinate of the perpendicular foot, with variance
    /// τᵀRτ.
    pub fn update(
        &self,
        belief: &mut Belief,
        observation: &Vector2<f64>,
        path_edge: &PathEdge,
    ) -> Result<(), TrackError> {
        match belief {
            Belief::Ground(ground) => {
                let h = Self::ground_observation_matrix();
                let innovation = observation - h * ground.mean;
                let s = h * ground.covariance * h.transpose() + self.obs_covariance;
                let s_inv = s
                    .try_inverse()
                    .ok_or_else(|| TrackError::numeric("singular innovation covariance"))?;
                let gain = ground.covariance * h.transpose() * s_inv;
                ground.mean += gain * innovation;
                ground.covariance = (Matrix4::identity() - gain * h) * ground.covariance;
                Cholesky::new(ground.covariance).ok_or_else(|| {
                    TrackError::numeric("ground covariance lost positive-definiteness in update")
                })?;
                Ok(())
            }
            Belief::Road(road) => {
                let edge = path_edge
                    .edge()
                    .ok_or_else(|| TrackError::graph("road update without an edge"))?;
                let (arc, _) = edge.project(observation);
                let dir = path_edge.direction_hint(road.mean[0]);
                let s_obs = path_edge.path_distance(arc, dir).unwrap_or(arc);
                let tau = edge.tangent_at(arc);
                let r = (tau.transpose() * self.obs_covariance * tau)[(0, 0)];
                let s_cov = road.covariance[(0, 0)] + r;
                if !(s_cov > 0.0) {
                    return Err(TrackError::numeric("singular innovation covariance"));
                }
                let gain = road.covariance.column(0).into_owned() / s_cov;
                let innovation = s_obs - road.mean[0];
                road.mean += gain * innovation;
                road.covariance -= gain * gain.transpose() * s_cov;
                Cholesky::new(road.covariance).ok_or_else(|| {
                    TrackError::numeric("road covariance lost positive-definiteness in update")
                })?;
                Ok(())
            }
        }
    }

    /// Gaussian log-density of the planar observation `z` under the
    /// predicted observation, always evaluated in ground coordinates: road
    /// beliefs are lifted through `path_edge` first.
    pub fn log_likelihood(
        &self,
        observation: &Vector2<f64>,
        belief: &Belief,
        path_edge: &PathEdge,
    ) -> Result<f64, TrackError> {
        let ground = match belief {
            Belief::Ground(g) => g.clone(),
            Belief::Road(r) => self.invert_projection(r, path_edge)?,
        };
        let h = Self::ground_observation_matrix();
        let predicted = h * ground.mean;
        let s = h * ground.covariance * h.transpose() + self.obs_covariance;
        let chol = Cholesky::new(s)
            .ok_or_else(|| TrackError::numeric("predicted observation covariance is not PSD"))?;
        let diff = observation - predicted;
        let maha = diff.dot(&chol.solve(&diff));
        let log_det = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        Ok(-0.5 * (2.0 * (2.0 * PI).ln() + log_det + maha))
    }

    // ========================================================================
    // PROJECTION OPERATORS
    // ========================================================================

    /// Lifts a road belief into the 4-D ground frame through `path_edge`.
    ///
    /// The mean maps to the point on the edge geometry at the belief's
    /// along-path coordinate, with velocity ṡ·τ along the unit tangent; the
    /// covariance transforms through the Jacobian of that map. A coordinate
    /// outside the edge extent clamps to it — deciding when to advance edges
    /// is path traversal's job, not an error here.
    pub fn invert_projection(
        &self,
        road: &RoadBelief,
        path_edge: &PathEdge,
    ) -> Result<GroundBelief, TrackError> {
        let edge = path_edge
            .edge()
            .ok_or_else(|| TrackError::graph("cannot lift a belief through the off-road marker"))?;
        let arc = path_edge.arc_position(road.mean[0]).unwrap_or(0.0);
        let tau = edge.tangent_at(arc);
        let point = edge.point_at(arc);
        let jac = Self::projection_factor(&tau);
        Ok(GroundBelief {
            mean: Vector4::new(
                point.x,
                road.mean[1] * tau.x,
                point.y,
                road.mean[1] * tau.y,
            ),
            covariance: jac * road.covariance * jac.transpose(),
        })
    }

    /// In-place variant of [`invert_projection`](Self::invert_projection).
    /// A ground belief passes through untouched.
    pub fn convert_to_ground_belief(
        &self,
        belief: &mut Belief,
        path_edge: &PathEdge,
    ) -> Result<(), TrackError> {
        if let Belief::Road(road) = belief {
            let lifted = self.invert_projection(road, path_edge)?;
            *belief = Belief::Ground(lifted);
        }
        Ok(())
    }

    /// Constrains a ground belief onto `path_edge`: position becomes the
    /// foot of the perpendicular, velocity its tangential component. The
    /// travel direction comes from the edge's `d0`, falling back to the
    /// tangential velocity's sign on a path-origin edge.
    pub fn project_onto_edge(
        &self,
        ground: &GroundBelief,
        path_edge: &PathEdge,
    ) -> Result<RoadBelief, TrackError> {
        let edge = path_edge
            .edge()
            .ok_or_else(|| TrackError::graph("cannot project onto the off-road marker"))?;
        let position = ground.position();
        let (arc, _) = edge.project(&position);
        let tau = edge.tangent_at(arc);
        let speed = ground.velocity().dot(&tau);
        let dir = path_edge.direction_hint(if speed < 0.0 { -1.0 } else { 1.0 });
        let s = path_edge.path_distance(arc, dir).unwrap_or(arc);
        let jac_t = Self::projection_factor(&tau).transpose();
        Ok(RoadBelief {
            mean: Vector2::new(s, speed),
            covariance: jac_t * ground.covariance * jac_t.transpose(),
        })
    }

    /// The 4×2 factor spreading (s, ṡ) onto (x, ẋ, y, ẏ) along a unit
    /// tangent.
    fn projection_factor(tau: &Vector2<f64>) -> Matrix4x2<f64> {
        Matrix4x2::new(
            tau.x, 0.0, //
            0.0, tau.x, //
            tau.y, 0.0, //
            0.0, tau.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeId, InferredEdge};
    use approx::assert_relative_eq;
    use geo::line_string;
    use std::sync::Arc;

    fn quiet_filter() -> RoadTrackingFilter {
        RoadTrackingFilter::new(&InitialParameters {
            obs_variance: [1.0, 1.0],
            on_road_state_variance: 0.0,
            off_road_state_variance: [0.0, 0.0],
            ..Default::default()
        })
        .unwrap()
    }

    fn edge_of_length(id: u64, length: f64) -> Arc<InferredEdge> {
        Arc::new(
            InferredEdge::new(
                EdgeId(id),
                line_string![(x: 0.0, y: 0.0), (x: length, y: 0.0)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_off_road_linear_drift() {
        // Start at (0,0) with velocity (1,0); one noiseless predict moves a
        // metre along x.
        let filter = quiet_filter();
        let mut belief = Belief::Ground(GroundBelief {
            mean: Vector4::new(0.0, 1.0, 0.0, 0.0),
            covariance: Matrix4::identity(),
        });
        filter
            .predict(&mut belief, 1.0, &PathEdge::empty(), Some(&PathEdge::empty()))
            .unwrap();

        let ground = belief.as_ground().unwrap();
        assert_relative_eq!(ground.mean[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ground.mean[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(ground.mean[2], 0.0, epsilon = 1e-6);
        assert_relative_eq!(ground.mean[3], 0.0, epsilon = 1e-6);

        // Observing exactly the predicted position leaves the mean in place
        // and shrinks the covariance.
        let trace_before = ground.covariance.trace();
        let mean_before = ground.mean;
        filter
            .update(&mut belief, &Vector2::new(1.0, 0.0), &PathEdge::empty())
            .unwrap();
        let ground = belief.as_ground().unwrap();
        assert_relative_eq!((ground.mean - mean_before).norm(), 0.0, epsilon = 1e-9);
        assert!(ground.covariance.trace() < trace_before);
    }

    #[test]
    fn test_on_road_single_edge_advance() {
        let filter = quiet_filter();
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);
        let mut belief = Belief::Road(RoadBelief {
            mean: Vector2::new(0.0, 10.0),
            covariance: Matrix2::identity(),
        });
        filter.predict(&mut belief, 2.0, &pe, Some(&pe)).unwrap();
        assert_relative_eq!(belief.as_road().unwrap().mean[0], 20.0, epsilon = 1e-6);
        assert_relative_eq!(belief.as_road().unwrap().mean[1], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_edge_change_rezeroes_origin() {
        let filter = quiet_filter();
        let old = PathEdge::new(edge_of_length(1, 50.0), 0.0);
        let new = PathEdge::new(edge_of_length(2, 50.0), 50.0);
        let mut belief = Belief::Road(RoadBelief {
            mean: Vector2::new(55.0, 5.0),
            covariance: Matrix2::identity(),
        });
        filter.predict(&mut belief, 1.0, &new, Some(&old)).unwrap();
        // 55 shifted back by the old edge's 50, then advanced by ṡ·Δt.
        assert_relative_eq!(belief.as_road().unwrap().mean[0], 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_non_positive_time_delta_fatal() {
        let filter = quiet_filter();
        let mut belief = Belief::Ground(filter.initial_ground_belief(&Vector2::zeros()));
        let result = filter.predict(&mut belief, 0.0, &PathEdge::empty(), None);
        assert!(matches!(result, Err(TrackError::NumericFailure(_))));
    }

    #[test]
    fn test_projection_round_trip_forward() {
        let filter = quiet_filter();
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);
        let road = RoadBelief {
            mean: Vector2::new(30.0, 7.0),
            covariance: Matrix2::new(9.0, 1.5, 1.5, 4.0),
        };
        let ground = filter.invert_projection(&road, &pe).unwrap();
        let back = filter.project_onto_edge(&ground, &pe).unwrap();
        assert_relative_eq!((back.mean - road.mean).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            (back.covariance - road.covariance).norm(),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_projection_round_trip_backward() {
        let filter = quiet_filter();
        // Path-origin edge entered from its end: s and ṡ both negative.
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);
        let road = RoadBelief {
            mean: Vector2::new(-40.0, -6.0),
            covariance: Matrix2::new(16.0, 0.5, 0.5, 2.0),
        };
        let ground = filter.invert_projection(&road, &pe).unwrap();
        let back = filter.project_onto_edge(&ground, &pe).unwrap();
        assert_relative_eq!((back.mean - road.mean).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            (back.covariance - road.covariance).norm(),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_regime_crossing_predictions() {
        let filter = quiet_filter();
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);

        // on → off lifts to 4-D.
        let mut belief = Belief::Road(RoadBelief {
            mean: Vector2::new(20.0, 5.0),
            covariance: Matrix2::identity(),
        });
        filter
            .predict(&mut belief, 1.0, &PathEdge::empty(), Some(&pe))
            .unwrap();
        assert_eq!(belief.dim(), 4);
        // Lifted at arc 20 moving along +x, then one second of drift.
        assert_relative_eq!(belief.as_ground().unwrap().mean[0], 25.0, epsilon = 1e-9);

        // off → on constrains to 2-D.
        let mut belief = Belief::Ground(GroundBelief {
            mean: Vector4::new(40.0, 3.0, 5.0, 0.0),
            covariance: Matrix4::identity(),
        });
        filter.predict(&mut belief, 1.0, &pe, None).unwrap();
        assert_eq!(belief.dim(), 2);
        // Foot of the perpendicular at arc 40, tangential speed 3.
        assert_relative_eq!(belief.as_road().unwrap().mean[0], 43.0, epsilon = 1e-9);
    }

    #[test]
    fn test_road_update_pulls_toward_projected_observation() {
        let filter = quiet_filter();
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);
        let mut belief = Belief::Road(RoadBelief {
            mean: Vector2::new(20.0, 0.0),
            covariance: Matrix2::new(25.0, 0.0, 0.0, 1.0),
        });
        filter
            .update(&mut belief, &Vector2::new(40.0, 3.0), &pe)
            .unwrap();
        let road = belief.as_road().unwrap();
        assert!(road.mean[0] > 20.0 && road.mean[0] < 40.0);
        assert!(road.covariance[(0, 0)] < 25.0);
    }

    #[test]
    fn test_log_likelihood_closed_form_at_mean() {
        let filter = quiet_filter();
        let belief = Belief::Ground(GroundBelief {
            mean: Vector4::new(10.0, 0.0, -5.0, 0.0),
            covariance: Matrix4::from_diagonal(&Vector4::new(3.0, 1.0, 2.0, 1.0)),
        });
        // S = diag(3+1, 2+1); density at the mean has zero Mahalanobis term.
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + (4.0_f64 * 3.0).ln());
        let got = filter
            .log_likelihood(&Vector2::new(10.0, -5.0), &belief, &PathEdge::empty())
            .unwrap();
        assert_relative_eq!(got, expected, epsilon = 1e-9);

        let farther = filter
            .log_likelihood(&Vector2::new(20.0, -5.0), &belief, &PathEdge::empty())
            .unwrap();
        assert!(farther < got);
    }

    #[test]
    fn test_log_likelihood_of_road_belief_uses_ground_form() {
        let filter = quiet_filter();
        let pe = PathEdge::new(edge_of_length(1, 100.0), 0.0);
        let road = RoadBelief {
            mean: Vector2::new(30.0, 0.0),
            covariance: Matrix2::new(4.0, 0.0, 0.0, 1.0),
        };
        let through_road = filter
            .log_likelihood(&Vector2::new(30.0, 2.0), &Belief::Road(road.clone()), &pe)
            .unwrap();
        let lifted = filter.invert_projection(&road, &pe).unwrap();
        let through_ground = filter
            .log_likelihood(&Vector2::new(30.0, 2.0), &Belief::Ground(lifted), &pe)
            .unwrap();
        assert_relative_eq!(through_road, through_ground, epsilon = 1e-12);
    }
}
