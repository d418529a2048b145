//! Primary-only reference variant.
//!
//! Keeps the heap-scheduled primary sampling of the fast engine but no
//! backup samples, so its counter records need only a primary refcount and
//! the processing pin. Used as a behavioral oracle against the fast core.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::sampler::SamplerId;
use super::x_term;
use crate::rng::{RandomSource, SeededPrng};
use crate::sketch::MgSketch;
use crate::{EstimatorError, EstimatorResult, MAX_WAIT, NONE};

const MERSENNE_61: u64 = (1 << 61) - 1;
const HASH_PARAM_SEED: u64 = 0x7ab1_e5ee;

#[derive(Debug, Clone)]
struct NaiveSampler {
    val_primary: i64,
    t0: f64,
    primary: usize,
    prim: i64,
}

impl NaiveSampler {
    fn new() -> Self {
        Self {
            val_primary: 0,
            t0: 1.0,
            primary: NONE,
            prim: 0,
        }
    }
}

#[derive(Debug)]
struct NaiveRecord {
    key: i32,
    count: i64,
    num_primary: u32,
    processing: bool,
    next: usize,
    prev: usize,
}

/// Counter table of the naive variant: same arena-and-buckets shape as the
/// fast table, but records are kept alive by primary references alone.
#[derive(Debug)]
struct NaiveTable {
    slots: Vec<NaiveRecord>,
    free: Vec<usize>,
    buckets: Vec<usize>,
    hash_a: u64,
    hash_b: u64,
}

impl NaiveTable {
    fn new(buckets: usize) -> Self {
        let mut param_rng = StdRng::seed_from_u64(HASH_PARAM_SEED);
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            buckets: vec![NONE; buckets.max(1)],
            hash_a: param_rng.gen_range(1..MERSENNE_61),
            hash_b: param_rng.gen_range(0..MERSENNE_61),
        }
    }

    fn bucket_of(&self, key: i32) -> usize {
        let x = key as u32 as u128;
        let h = (self.hash_a as u128 * x + self.hash_b as u128) % MERSENNE_61 as u128;
        (h % self.buckets.len() as u128) as usize
    }

    fn touch(&mut self, key: i32) -> usize {
        let bucket = self.bucket_of(key);
        let mut cursor = self.buckets[bucket];
        while cursor != NONE {
            let record = &mut self.slots[cursor];
            if record.key == key {
                record.count += 1;
                record.processing = true;
                return cursor;
            }
            cursor = record.next;
        }
        let id = match self.free.pop() {
            Some(id) => {
                let record = &mut self.slots[id];
                record.key = key;
                record.count = 1;
                record.num_primary = 0;
                record.processing = true;
                record.next = NONE;
                record.prev = NONE;
                id
            }
            None => {
                self.slots.push(NaiveRecord {
                    key,
                    count: 1,
                    num_primary: 0,
                    processing: true,
                    next: NONE,
                    prev: NONE,
                });
                self.slots.len() - 1
            }
        };
        let head = self.buckets[bucket];
        self.slots[id].next = head;
        if head != NONE {
            self.slots[head].prev = id;
        }
        self.buckets[bucket] = id;
        id
    }

    fn inc_primary(&mut self, id: usize) {
        self.slots[id].num_primary += 1;
    }

    fn dec_primary(&mut self, id: usize) {
        self.slots[id].num_primary -= 1;
        if self.slots[id].num_primary == 0 && !self.slots[id].processing {
            self.unlink_and_free(id);
        }
    }

    fn done_processing(&mut self, id: usize) {
        self.slots[id].processing = false;
        if self.slots[id].num_primary == 0 {
            self.unlink_and_free(id);
        }
    }

    fn unlink_and_free(&mut self, id: usize) {
        let bucket = self.bucket_of(self.slots[id].key);
        let (prev, next) = (self.slots[id].prev, self.slots[id].next);
        if prev == NONE {
            self.buckets[bucket] = next;
        } else {
            self.slots[prev].next = next;
        }
        if next != NONE {
            self.slots[next].prev = prev;
        }
        self.free.push(id);
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.buckets.capacity() * std::mem::size_of::<usize>()
            + self.slots.capacity() * std::mem::size_of::<NaiveRecord>()
            + self.free.capacity() * std::mem::size_of::<usize>()
    }
}

/// Naive streaming entropy estimator: primary samples only.
pub struct NaiveEstimator {
    c: usize,
    count: i64,
    samplers: Vec<NaiveSampler>,
    table: NaiveTable,
    sketch: MgSketch,
    prim_heap: BinaryHeap<Reverse<(i64, SamplerId)>>,
    rng: Box<dyn RandomSource>,
}

impl NaiveEstimator {
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
        debug!(c, k, "initializing naive estimator");
        Ok(Self {
            c,
            count: 0,
            samplers: vec![NaiveSampler::new(); c],
            table: NaiveTable::new(c),
            sketch: MgSketch::new(k),
            prim_heap: BinaryHeap::with_capacity(c),
            rng,
        })
    }

    pub fn tokens_seen(&self) -> u64 {
        self.count as u64
    }

    pub fn update(&mut self, token: i32) {
        self.count += 1;
        self.sketch.update(token);
        let current = self.table.touch(token);

        if self.count == 1 {
            self.handle_first(current);
            return;
        }

        while let Some(&Reverse((prim, sid))) = self.prim_heap.peek() {
            if prim > self.count {
                break;
            }
            self.prim_heap.pop();
            if prim < self.count {
                panic!(
                    "invariant violated: sampler {} primary fire index {} fell behind stream index {}",
                    sid, prim, self.count
                );
            }
            let old_primary = self.samplers[sid].primary;
            self.table.dec_primary(old_primary);
            self.table.inc_primary(current);
            let u = self.rng.next_float();
            {
                let s = &mut self.samplers[sid];
                s.primary = current;
                s.val_primary = self.table.slots[current].count;
                s.t0 *= u;
            }
            self.reset_wait_time(sid);
            self.prim_heap
                .push(Reverse((self.samplers[sid].prim, sid)));
        }
        self.table.done_processing(current);
    }

    fn handle_first(&mut self, current: usize) {
        for i in 0..self.c {
            let u = self.rng.next_float();
            {
                let s = &mut self.samplers[i];
                s.primary = current;
                s.val_primary = 1;
                s.t0 = u;
            }
            self.table.inc_primary(current);
            self.reset_wait_time(i);
            self.prim_heap.push(Reverse((self.samplers[i].prim, i)));
        }
    }

    /// Geometric redraw of the next primary sampling position. Unlike the
    /// fast engine this clamps the wait, not the absolute fire index.
    fn reset_wait_time(&mut self, sid: SamplerId) {
        let r0 = self.rng.next_float();
        let s = &mut self.samplers[sid];
        if r0 == 0.0 {
            s.prim = self.count + 1;
        } else if s.t0 == 0.0 {
            s.prim = MAX_WAIT;
        } else {
            let wait = (r0.ln() / (1.0 - s.t0).ln()).ceil();
            s.prim = if wait.is_finite() && (0.0..=MAX_WAIT as f64).contains(&wait) {
                wait as i64 + self.count
            } else {
                MAX_WAIT
            };
        }
    }

    pub fn finalize(&self) -> f64 {
        let m = self.count;
        if m == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for s in &self.samplers {
            let r = self.table.slots[s.primary].count - s.val_primary + 1;
            sum += x_term(r, m);
        }
        sum / self.c as f64
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.samplers.capacity() * std::mem::size_of::<NaiveSampler>()
            + self.sketch.size_bytes()
            + self.table.size_bytes()
            + self.prim_heap.capacity() * std::mem::size_of::<Reverse<(i64, SamplerId)>>()
    }
}
