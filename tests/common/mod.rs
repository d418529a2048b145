//! Shared helpers for the integration suites.
// Each suite pulls in the subset of runners it needs.
#![allow(dead_code)]

use stream_entropy::{Estimator, NaiveEstimator, SlowEstimator};

pub fn run_fast(tokens: &[i32], c: usize, k: usize, seed: u64) -> f64 {
    let mut est = Estimator::new(c, k, seed).expect("valid parameters");
    for &t in tokens {
        est.update(t);
    }
    est.finalize()
}

pub fn run_naive(tokens: &[i32], c: usize, k: usize, seed: u64) -> f64 {
    let mut est = NaiveEstimator::new(c, k, seed).expect("valid parameters");
    for &t in tokens {
        est.update(t);
    }
    est.finalize()
}

pub fn run_slow(tokens: &[i32], c: usize, k: usize, seed: u64) -> f64 {
    let mut est = SlowEstimator::new(c, k, seed).expect("valid parameters");
    for &t in tokens {
        est.update(t);
    }
    est.finalize()
}
