//! O(c)-per-token reference variant.
//!
//! Every sampler is updated on every token, so there is no shared state, no
//! heaps, and no counter table: each sampler counts occurrences of its own
//! two samples directly. Thresholds are 31-bit integers instead of floats.

use tracing::debug;

use super::x_term;
use crate::rng::{RandomSource, SeededPrng};
use crate::sketch::MgSketch;
use crate::{EstimatorError, EstimatorResult};

/// Largest 31-bit threshold; fresh samplers start here so the first token
/// always wins the race.
const THRESHOLD_MAX: i64 = (1 << 31) - 1;

#[derive(Debug, Clone)]
struct SlowSampler {
    s0: i32,
    s1: i32,
    r0: i64,
    r1: i64,
    t0: i64,
    t1: i64,
}

impl SlowSampler {
    fn new() -> Self {
        Self {
            s0: 0,
            s1: 0,
            r0: 0,
            r1: 0,
            t0: THRESHOLD_MAX,
            t1: THRESHOLD_MAX,
        }
    }

    /// One token through the two-sample record race.
    fn update(&mut self, rng: &mut dyn RandomSource, token: i32) {
        let draw = rng.next_int() as i64;
        if token == self.s0 {
            if draw < self.t0 {
                self.t0 = draw;
                self.r0 = 1;
            } else {
                self.r0 += 1;
            }
        } else {
            if token == self.s1 {
                self.r1 += 1;
            }
            if draw < self.t0 {
                self.s1 = self.s0;
                self.t1 = self.t0;
                self.r1 = self.r0;
                self.s0 = token;
                self.t0 = draw;
                self.r0 = 1;
            } else if draw < self.t1 {
                self.s1 = token;
                self.t1 = draw;
                self.r1 = 1;
            }
        }
    }
}

/// Slow streaming entropy estimator: the per-token work is O(c), with the
/// same finalize combination as the fast engine.
pub struct SlowEstimator {
    c: usize,
    count: i64,
    samplers: Vec<SlowSampler>,
    sketch: MgSketch,
    rng: Box<dyn RandomSource>,
}

impl SlowEstimator {
    pub fn new(c: usize, k: usize, seed: u64) -> EstimatorResult<Self> {
        Self::with_source(c, k, Box::new(SeededPrng::new(seed)))
    }

    pub fn with_source(
        c: usize,
        k: usize,
        rng: Box<dyn RandomSource>,
    ) -> EstimatorResult<Self> {
        if c < 1 {
            return Err(EstimatorError::InvalidSamplerCount(c));
        }
        if k < 1 {
            return Err(EstimatorError::InvalidCounterBudget(k));
        }
        debug!(c, k, "initializing slow estimator");
        Ok(Self {
            c,
            count: 0,
            samplers: vec![SlowSampler::new(); c],
            sketch: MgSketch::new(k),
            rng,
        })
    }

    pub fn tokens_seen(&self) -> u64 {
        self.count as u64
    }

    pub fn update(&mut self, token: i32) {
        self.count += 1;
        self.sketch.update(token);
        for sampler in &mut self.samplers {
            sampler.update(self.rng.as_mut(), token);
        }
    }

    pub fn finalize(&self) -> f64 {
        let m = self.count;
        if m == 0 {
            return 0.0;
        }
        let (max_token, max_count) = self.sketch.save_max();
        let heavy = max_count > m / 2;
        debug!(max_token, max_count, heavy, "finalizing entropy estimate");

        if heavy {
            let p_max = max_count as f64 / m as f64;
            let mut sum = 0.0;
            for s in &self.samplers {
                let r = if s.s0 == max_token { s.r1 } else { s.r0 };
                sum += x_term(r, m);
            }
            let avg = sum / self.c as f64;
            (1.0 - p_max) * avg + p_max * (1.0 / p_max).log2()
        } else {
            let mut sum = 0.0;
            for s in &self.samplers {
                sum += x_term(s.r0, m);
            }
            sum / self.c as f64
        }
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.samplers.capacity() * std::mem::size_of::<SlowSampler>()
            + self.sketch.size_bytes()
    }
}
