//! Error taxonomy for the estimator core.

use thiserror::Error;

/// Errors surfaced by the estimator core.
///
/// Numeric and graph failures are fatal for the affected vehicle and
/// propagate upward unmodified. Time-order violations are recoverable:
/// the offending observation is rejected and the vehicle state is left
/// unchanged.
#[derive(Debug, Clone, Error)]
pub enum TrackError {
    /// An observation is not newer than its predecessor in the chain.
    #[error("observation at t={observed} is not newer than its predecessor at t={previous}")]
    TimeOrder { previous: f64, observed: f64 },

    /// A coordinate conversion failed.
    #[error("not georeferenced: {0}")]
    NotGeoreferenced(String),

    /// Covariance lost positive-definiteness, an innovation covariance went
    /// singular, or a Cholesky factorisation failed. The affected vehicle
    /// state should be discarded; no covariance regularisation is attempted.
    #[error("numeric failure: {0}")]
    NumericFailure(String),

    /// A sampled transfer edge is not adjacent to the current edge, or a
    /// path violates the graph adjacency invariants. Indicates a bug in the
    /// graph view.
    #[error("graph inconsistency: {0}")]
    GraphInconsistency(String),

    /// The requested operation is deliberately unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl TrackError {
    /// Creates a numeric failure.
    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::NumericFailure(msg.into())
    }

    /// Creates a graph inconsistency.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::GraphInconsistency(msg.into())
    }

    /// Creates a georeferencing failure.
    pub fn georef(msg: impl Into<String>) -> Self {
        Self::NotGeoreferenced(msg.into())
    }
}
