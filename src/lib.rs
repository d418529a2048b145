// Allow uppercase acronyms for standard algorithm names like MG (Misra-Gries)
#![allow(clippy::upper_case_acronyms)]

pub mod estimator;
pub mod heaps;
pub mod rng;
pub mod sketch;
pub mod stream;
pub mod table;

// Re-export the main entry points for convenience
pub use estimator::naive::NaiveEstimator;
pub use estimator::slow::SlowEstimator;
pub use estimator::Estimator;
pub use rng::{RandomSource, SeededPrng};

use thiserror::Error;

/// Largest wait a sampler can be scheduled for. Overflowing geometric draws
/// are clamped here so fire times stay comparable as plain integers.
pub(crate) const MAX_WAIT: i64 = 900_000_000;

/// Sentinel for "not present" back-indices (heap positions, arena links).
pub(crate) const NONE: usize = usize::MAX;

/// Configuration errors reported before any update is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("number of samplers must be at least 1, got {0}")]
    InvalidSamplerCount(usize),

    #[error("Misra-Gries counter budget must be at least 1, got {0}")]
    InvalidCounterBudget(usize),

    #[error("epsilon must be in (0, 1], got {0}")]
    InvalidEpsilon(f64),

    #[error("delta must be in (0, 1], got {0}")]
    InvalidDelta(f64),
}

pub type EstimatorResult<T> = Result<T, EstimatorError>;

/// Sampler and counter budgets for an (epsilon, delta) accuracy target over
/// a stream of the given expected length:
/// c = ceil(16/eps^2 * ln(2/delta) * ln(m*e)), k = ceil(7/eps).
pub fn calibrate(epsilon: f64, delta: f64, length: u64) -> EstimatorResult<(usize, usize)> {
    if !(epsilon > 0.0 && epsilon <= 1.0) {
        return Err(EstimatorError::InvalidEpsilon(epsilon));
    }
    if !(delta > 0.0 && delta <= 1.0) {
        return Err(EstimatorError::InvalidDelta(delta));
    }
    let m = length.max(1) as f64;
    let c = (16.0 / (epsilon * epsilon) * (2.0 / delta).ln() * (m * std::f64::consts::E).ln())
        .ceil() as usize;
    let k = (7.0 / epsilon).ceil() as usize;
    Ok((c.max(1), k.max(1)))
}
