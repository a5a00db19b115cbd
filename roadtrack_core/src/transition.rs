//! Edge-transition distribution.
//!
//! Governs when a vehicle enters or leaves the road network. Two 2-way
//! Bayesian categoricals with Dirichlet pseudo-counts: off-road
//! {stay off, move on} and on-road {stay on, move off}. When the vehicle
//! stays on the network the destination edge is a uniform pick from the
//! admissible transfer set; that uniform term is part of the density, so
//! the distribution normalizes over the discrete space.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::InitialParameters;
use crate::graph::InferredEdge;
use crate::path::PathEdge;

/// Index of "stay in the current regime" in either pseudo-count pair.
const STAY: usize = 0;
/// Index of "switch regime".
const SWITCH: usize = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTransitionDistribution {
    /// Pseudo-counts over {stay off-road, move on-road}.
    off_road: [f64; 2],

    /// Pseudo-counts over {stay on-road, move off-road}.
    on_road: [f64; 2],
}

impl EdgeTransitionDistribution {
    pub fn new(params: &InitialParameters) -> Self {
        Self {
            off_road: params.off_transition_probs,
            on_road: params.on_transition_probs,
        }
    }

    /// Posterior-predictive probability of staying off the network.
    pub fn stay_off_probability(&self) -> f64 {
        self.off_road[STAY] / (self.off_road[STAY] + self.off_road[SWITCH])
    }

    /// Posterior-predictive probability of staying on the network.
    pub fn stay_on_probability(&self) -> f64 {
        self.on_road[STAY] / (self.on_road[STAY] + self.on_road[SWITCH])
    }

    /// Log-density of the transition `prev → next`.
    ///
    /// `choices` is the size of the discrete destination set the uniform
    /// pick ranged over: nearby edges when entering the network, the
    /// transfer set when staying on it. It is ignored for the off-road
    /// outcomes.
    pub fn log_evaluate(&self, prev: &PathEdge, next: &PathEdge, choices: usize) -> f64 {
        let uniform = -(choices.max(1) as f64).ln();
        match (prev.is_empty(), next.is_empty()) {
            (true, true) => self.stay_off_probability().ln(),
            (true, false) => (1.0 - self.stay_off_probability()).ln() + uniform,
            (false, true) => (1.0 - self.stay_on_probability()).ln(),
            (false, false) => self.stay_on_probability().ln() + uniform,
        }
    }

    /// Records an observed transition, incrementing the matching posterior
    /// component.
    pub fn observe(&mut self, prev: &PathEdge, next: &PathEdge) {
        match (prev.is_empty(), next.is_empty()) {
            (true, true) => self.off_road[STAY] += 1.0,
            (true, false) => self.off_road[SWITCH] += 1.0,
            (false, true) => self.on_road[SWITCH] += 1.0,
            (false, false) => self.on_road[STAY] += 1.0,
        }
    }

    /// Draws the next edge: `None` for the off-road outcome, otherwise a
    /// uniform pick from `transfer_edges`. An empty choice set degrades to
    /// the off-road outcome.
    pub fn sample<R: Rng>(
        &self,
        rng: &mut R,
        transfer_edges: &[Arc<InferredEdge>],
        current: &PathEdge,
    ) -> Option<Arc<InferredEdge>> {
        let on_network = if current.is_empty() {
            rng.gen::<f64>() >= self.stay_off_probability()
        } else {
            rng.gen::<f64>() < self.stay_on_probability()
        };
        if !on_network || transfer_edges.is_empty() {
            return None;
        }
        let pick = rng.gen_range(0..transfer_edges.len());
        Some(transfer_edges[pick].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeId, InferredEdge};
    use approx::assert_relative_eq;
    use geo::line_string;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn edge(id: u64) -> Arc<InferredEdge> {
        Arc::new(
            InferredEdge::new(
                EdgeId(id),
                line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)],
            )
            .unwrap(),
        )
    }

    fn distribution() -> EdgeTransitionDistribution {
        EdgeTransitionDistribution::new(&InitialParameters {
            off_transition_probs: [3.0, 1.0],
            on_transition_probs: [7.0, 2.0],
            ..Default::default()
        })
    }

    #[test]
    fn test_discrete_density_normalizes_on_road() {
        let dist = distribution();
        let current = PathEdge::new(edge(1), 0.0);
        let outgoing = 3usize;

        let mut mass = dist.log_evaluate(&current, &PathEdge::empty(), outgoing).exp();
        for i in 0..outgoing {
            let next = PathEdge::new(edge(10 + i as u64), 10.0);
            mass += dist.log_evaluate(&current, &next, outgoing).exp();
        }
        assert_relative_eq!(mass, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_discrete_density_normalizes_off_road() {
        let dist = distribution();
        let nearby = 5usize;

        let mut mass = dist
            .log_evaluate(&PathEdge::empty(), &PathEdge::empty(), nearby)
            .exp();
        for i in 0..nearby {
            let next = PathEdge::new(edge(20 + i as u64), 0.0);
            mass += dist.log_evaluate(&PathEdge::empty(), &next, nearby).exp();
        }
        assert_relative_eq!(mass, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_observe_shifts_posterior() {
        let mut dist = distribution();
        let before = dist.stay_on_probability();
        dist.observe(&PathEdge::new(edge(1), 0.0), &PathEdge::empty());
        assert!(dist.stay_on_probability() < before);

        let before_off = dist.stay_off_probability();
        dist.observe(&PathEdge::empty(), &PathEdge::empty());
        assert!(dist.stay_off_probability() > before_off);
    }

    #[test]
    fn test_sample_respects_saturated_priors() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let stay_on = EdgeTransitionDistribution::new(&InitialParameters {
            on_transition_probs: [1e12, 1e-12],
            ..Default::default()
        });
        let current = PathEdge::new(edge(1), 0.0);
        let transfers = vec![edge(2), edge(3)];
        for _ in 0..64 {
            assert!(stay_on.sample(&mut rng, &transfers, &current).is_some());
        }

        let leave = EdgeTransitionDistribution::new(&InitialParameters {
            on_transition_probs: [1e-12, 1e12],
            ..Default::default()
        });
        for _ in 0..64 {
            assert!(leave.sample(&mut rng, &transfers, &current).is_none());
        }
    }

    #[test]
    fn test_sample_empty_choice_set_degrades_to_off_road() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let dist = EdgeTransitionDistribution::new(&InitialParameters {
            off_transition_probs: [1e-12, 1e12], // always wants to move on
            ..Default::default()
        });
        assert!(dist.sample(&mut rng, &[], &PathEdge::empty()).is_none());
    }

    #[test]
    fn test_sample_deterministic_for_fixed_seed() {
        let dist = distribution();
        let current = PathEdge::new(edge(1), 0.0);
        let transfers = vec![edge(2), edge(3), edge(4)];

        let run = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..32)
                .map(|_| dist.sample(&mut rng, &transfers, &current).map(|e| e.id))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }
}
