//! Estimator configuration.

use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Tunable priors and noise levels for the tracking filter, the
/// edge-transition distribution, and the trajectory sampler.
///
/// All variances are in SI units over the projected metric plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialParameters {
    /// Diagonal of the observation covariance R, in m².
    pub obs_variance: [f64; 2],

    /// Along-edge acceleration variance for the road filter, in (m/s²)².
    pub on_road_state_variance: f64,

    /// Per-axis acceleration variance for the ground filter, in (m/s²)².
    pub off_road_state_variance: [f64; 2],

    /// Dirichlet pseudo-counts over {stay off-road, move on-road}.
    pub off_transition_probs: [f64; 2],

    /// Dirichlet pseudo-counts over {stay on-road, move off-road}.
    pub on_transition_probs: [f64; 2],

    /// Seed for the trajectory sampler. Zero requests a fresh OS seed;
    /// any other value reproduces trajectories bit-for-bit.
    pub seed: u64,

    /// Time step assumed for an observation with no predecessor, in seconds.
    pub initial_time_diff: f64,
}

impl Default for InitialParameters {
    fn default() -> Self {
        Self {
            obs_variance: [25.0, 25.0],          // 5 m standard deviation
            on_road_state_variance: 1.0,         // 1 m/s² along-edge
            off_road_state_variance: [0.5, 0.5], // gentler free-plane drift
            off_transition_probs: [10.0, 1.0],   // off-road vehicles mostly stay off
            on_transition_probs: [20.0, 1.0],    // on-road vehicles rarely leave
            seed: 0,
            initial_time_diff: 30.0,
        }
    }
}

impl InitialParameters {
    /// Rejects configurations that would poison the filter downstream.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.obs_variance.iter().any(|v| *v <= 0.0) {
            return Err(TrackError::numeric("obs_variance must be positive"));
        }
        if self.on_road_state_variance < 0.0 {
            return Err(TrackError::numeric("on_road_state_variance must be non-negative"));
        }
        if self.off_road_state_variance.iter().any(|v| *v < 0.0) {
            return Err(TrackError::numeric("off_road_state_variance must be non-negative"));
        }
        if self.off_transition_probs.iter().any(|a| *a <= 0.0)
            || self.on_transition_probs.iter().any(|a| *a <= 0.0)
        {
            return Err(TrackError::numeric("transition pseudo-counts must be positive"));
        }
        if self.initial_time_diff <= 0.0 {
            return Err(TrackError::numeric("initial_time_diff must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_validate() {
        assert!(InitialParameters::default().validate().is_ok());
    }

    #[test]
    fn test_zero_obs_variance_rejected() {
        let params = InitialParameters {
            obs_variance: [0.0, 25.0],
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TrackError::NumericFailure(_))
        ));
    }

    #[test]
    fn test_zero_pseudo_counts_rejected() {
        let params = InitialParameters {
            on_transition_probs: [0.0, 1.0],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
