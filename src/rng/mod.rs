//! Uniform random sources for the sampling protocol.
//!
//! The estimators only ever ask for two things: a uniform float in [0, 1)
//! and a uniform non-negative 31-bit integer. Keeping that behind a trait
//! lets tests substitute an exact draw sequence.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Source of uniform randomness driving the sampling protocol.
///
/// Implementations must be deterministic for a fixed starting state: two
/// sources constructed identically yield identical draw sequences.
pub trait RandomSource {
    /// Uniform float in [0, 1). May return exactly 0.0.
    fn next_float(&mut self) -> f64;

    /// Uniform integer in [0, 2^31).
    fn next_int(&mut self) -> i32;
}

/// Default random source: a seeded `StdRng`.
pub struct SeededPrng {
    rng: StdRng,
}

impl SeededPrng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededPrng {
    fn next_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_int(&mut self) -> i32 {
        (self.rng.next_u32() >> 1) as i32
    }
}

/// Replays a fixed sequence of draws, then falls back to a seeded source.
/// Test-only: used to steer the protocol into specific branches.
#[cfg(test)]
pub(crate) struct ScriptedSource {
    script: std::collections::VecDeque<f64>,
    fallback: SeededPrng,
}

#[cfg(test)]
impl ScriptedSource {
    pub(crate) fn new(script: &[f64], fallback_seed: u64) -> Self {
        Self {
            script: script.iter().copied().collect(),
            fallback: SeededPrng::new(fallback_seed),
        }
    }
}

#[cfg(test)]
impl RandomSource for ScriptedSource {
    fn next_float(&mut self) -> f64 {
        match self.script.pop_front() {
            Some(v) => v,
            None => self.fallback.next_float(),
        }
    }

    fn next_int(&mut self) -> i32 {
        self.fallback.next_int()
    }
}

#[cfg(test)]
mod rng_tests;
