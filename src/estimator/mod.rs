//! Entropy estimators over integer token streams.
//!
//! `Estimator` is the fast engine: c samplers kept synchronized with the
//! stream in amortized O(log c) per token by sharing counter records and by
//! scheduling every sampler's next action in two priority structures (the
//! primary heap and the backup heap). `naive` and `slow` are the reference
//! variants used to cross-validate it.

pub mod naive;
pub mod sampler;
pub mod slow;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::heaps::BackupHeap;
use crate::rng::{RandomSource, SeededPrng};
use crate::sketch::MgSketch;
use crate::table::{CounterId, CounterTable};
use crate::{EstimatorError, EstimatorResult, MAX_WAIT, NONE};
use sampler::{Sampler, SamplerId};

/// One X(r, m) contribution of a sampler to the entropy estimate:
/// r*log2(m/r) - (r-1)*log2(m/(r-1)), where a term with a zero leading
/// factor is zero.
pub(crate) fn x_term(r: i64, m: i64) -> f64 {
    let mut x = 0.0;
    if r > 0 {
        x += r as f64 * (m as f64 / r as f64).log2();
    }
    if r > 1 {
        x -= (r - 1) as f64 * (m as f64 / (r - 1) as f64).log2();
    }
    x
}

/// Redraw both wait times of `s` from the geometric distributions with
/// success rates t0 (primary) and t1 - t0 (backup). `primary_count` is the
/// current count of the sampler's primary record; the backup wait is stored
/// relative to it.
pub(crate) fn reset_wait_times(
    s: &mut Sampler,
    count: i64,
    primary_count: i64,
    rng: &mut dyn RandomSource,
) {
    let r0 = rng.next_float();
    let r1 = rng.next_float();

    // log(0) is undefined, so a zero draw schedules the very next position.
    if r0 == 0.0 {
        s.prim = count + 1;
    } else if s.t0 == 0.0 {
        // t0 underflowed to zero: the race can no longer be won.
        s.prim = MAX_WAIT;
    } else {
        let fire = (r0.ln() / (1.0 - s.t0).ln()).ceil() + count as f64;
        s.prim = if fire.is_finite() && (0.0..=MAX_WAIT as f64).contains(&fire) {
            fire as i64
        } else {
            MAX_WAIT
        };
    }

    reset_backup_wait(s, count, primary_count, r1);
}

/// Backup half of `reset_wait_times`, also used alone when only the backup
/// sample is replaced. `r1` is the caller's fresh uniform draw.
pub(crate) fn reset_backup_wait(s: &mut Sampler, count: i64, primary_count: i64, r1: f64) {
    if r1 == 0.0 {
        s.backup_minus_delay = count + 1 - primary_count;
    } else if s.t1 - s.t0 == 0.0 {
        s.backup_minus_delay = MAX_WAIT - primary_count;
    } else {
        let wait = (r1.ln() / (1.0 - (s.t1 - s.t0)).ln()).ceil();
        s.backup_minus_delay = if wait.is_finite() && (0.0..=MAX_WAIT as f64).contains(&wait) {
            wait as i64 + count - primary_count
        } else {
            MAX_WAIT - primary_count
        };
    }
}

/// Fast streaming entropy estimator.
///
/// Feed tokens with [`update`](Estimator::update), then read the estimate
/// with [`finalize`](Estimator::finalize). Construction fixes the number of
/// samplers c and the Misra-Gries counter budget k for the whole run.
pub struct Estimator {
    c: usize,
    k: usize,
    count: i64,
    two_distinct_tokens: bool,
    /// The very first counter record, needed by the startup special cases.
    first: CounterId,
    samplers: Vec<Sampler>,
    table: CounterTable,
    sketch: MgSketch,
    /// Samplers ordered by next primary fire index. Entries are pushed only
    /// after a pop, so a sampler appears exactly once and is never stale.
    prim_heap: BinaryHeap<Reverse<(i64, SamplerId)>>,
    backup_heap: BackupHeap,
    rng: Box<dyn RandomSource>,
}

impl Estimator {
    /// Estimator with `c` samplers and `k` Misra-Gries counters, drawing
    /// sampling randomness from a source seeded with `seed`.
    pub fn new(c: usize, k: usize, seed: u64) -> EstimatorResult<Self> {
        Self::with_source(c, k, Box::new(SeededPrng::new(seed)))
    }

    /// Same, with an explicit random source.
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
        debug!(c, k, "initializing fast estimator");
        Ok(Self {
            c,
            k,
            count: 0,
            two_distinct_tokens: false,
            first: NONE,
            samplers: vec![Sampler::new(); c],
            table: CounterTable::new(2 * c),
            sketch: MgSketch::new(k),
            prim_heap: BinaryHeap::with_capacity(c),
            backup_heap: BackupHeap::with_capacity(c),
            rng,
        })
    }

    pub fn sampler_count(&self) -> usize {
        self.c
    }

    pub fn counter_budget(&self) -> usize {
        self.k
    }

    /// Stream positions consumed so far.
    pub fn tokens_seen(&self) -> u64 {
        self.count as u64
    }

    /// Process one token from the stream.
    pub fn update(&mut self, token: i32) {
        self.count += 1;
        self.sketch.update(token);
        let current = self.table.touch(token);

        if self.count == 1 {
            self.first = current;
            self.handle_first(current);
            return;
        }
        if self.table.arena[current].count == self.count {
            self.handle_nondistinct(current);
            return;
        }
        if !self.two_distinct_tokens {
            self.handle_second_distinct(current);
            self.table.done_processing(current);
            let first = self.first;
            self.table.done_processing(first);
            return;
        }

        // The current record's count changed, so its backup-heap key did too.
        let bpos = self.table.arena[current].backup_pos;
        self.backup_heap
            .restore_at(&mut self.table.arena, &self.samplers, bpos);

        self.drain_primary_fires(current);
        self.drain_backup_fires(current);
        self.table.done_processing(current);
    }

    /// First token of the stream: every sampler samples it. The samplers
    /// enter the heaps only once a second distinct token shows up.
    fn handle_first(&mut self, current: CounterId) {
        for i in 0..self.c {
            let u = self.rng.next_float();
            let s = &mut self.samplers[i];
            s.primary = current;
            s.val_primary = 1;
            s.t0 = u;
        }
    }

    /// Every token so far has been identical: the samplers just race their
    /// thresholds down, re-sampling the single known token.
    fn handle_nondistinct(&mut self, current: CounterId) {
        let count = self.table.arena[current].count;
        for i in 0..self.c {
            let u = self.rng.next_float();
            let s = &mut self.samplers[i];
            if u < s.t0 {
                s.t0 = u;
                s.val_primary = count;
            }
        }
    }

    /// First token that differs from the opening run: each sampler either
    /// promotes it to primary (demoting the old primary to backup) or takes
    /// it as backup, then starts real scheduling.
    fn handle_second_distinct(&mut self, current: CounterId) {
        self.two_distinct_tokens = true;
        for i in 0..self.c {
            let u = self.rng.next_float();
            {
                let s = &mut self.samplers[i];
                if u < s.t0 {
                    s.val_backup = s.val_primary;
                    s.backup = s.primary;
                    s.t1 = s.t0;
                    s.val_primary = 1;
                    s.primary = current;
                    s.t0 = u;
                } else {
                    s.val_backup = 1;
                    s.backup = current;
                    s.t1 = u;
                }
            }
            // Wait times must be set before the heap insertions below; the
            // backup-heap key reads them.
            let primary_count = self.table.arena[self.samplers[i].primary].count;
            reset_wait_times(
                &mut self.samplers[i],
                self.count,
                primary_count,
                self.rng.as_mut(),
            );
            self.prim_heap.push(Reverse((self.samplers[i].prim, i)));
            let (primary, backup) = (self.samplers[i].primary, self.samplers[i].backup);
            self.table
                .inc_primary(primary, i, &mut self.backup_heap, &mut self.samplers);
            self.table.inc_backup(backup);
        }
    }

    /// Pop and re-arm every sampler scheduled to take a new primary sample
    /// at the current stream position.
    fn drain_primary_fires(&mut self, current: CounterId) {
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
            let u = self.rng.next_float();
            if self.samplers[sid].primary == current {
                // New sample is the same token: refresh the snapshot and the
                // race, keep the record.
                let primary_count = self.table.arena[current].count;
                {
                    let s = &mut self.samplers[sid];
                    s.val_primary = primary_count;
                    s.t0 *= u;
                }
                reset_wait_times(
                    &mut self.samplers[sid],
                    self.count,
                    primary_count,
                    self.rng.as_mut(),
                );
                let pos = self.samplers[sid].primary_pos;
                self.table.arena[current]
                    .sample_heap
                    .restore_at(&mut self.samplers, pos);
                let bpos = self.table.arena[current].backup_pos;
                self.backup_heap
                    .restore_at(&mut self.table.arena, &self.samplers, bpos);
            } else {
                let old_backup = self.samplers[sid].backup;
                let primary_count = self.table.arena[current].count;
                {
                    let s = &mut self.samplers[sid];
                    s.backup = s.primary;
                    s.val_backup = s.val_primary;
                    s.t1 = s.t0;
                    s.primary = current;
                    s.val_primary = primary_count;
                    s.t0 *= u;
                }
                reset_wait_times(
                    &mut self.samplers[sid],
                    self.count,
                    primary_count,
                    self.rng.as_mut(),
                );
                // Reference the demoted primary as backup before releasing
                // anything, so no record is transiently destroyed.
                let demoted = self.samplers[sid].backup;
                self.table.inc_backup(demoted);
                self.table.dec_backup(old_backup);
                self.table
                    .dec_primary(demoted, sid, &mut self.backup_heap, &mut self.samplers);
                self.table
                    .inc_primary(current, sid, &mut self.backup_heap, &mut self.samplers);
            }
            self.prim_heap
                .push(Reverse((self.samplers[sid].prim, sid)));
        }
    }

    /// Re-point every sampler scheduled to replace its backup sample at the
    /// current stream position. The backup heap's root record and its sample
    /// heap's root sampler identify the next such event in O(1).
    fn drain_backup_fires(&mut self, current: CounterId) {
        loop {
            let holder = match self.backup_heap.peek() {
                Some(id) => id,
                None => panic!("invariant violated: backup heap empty while samplers are armed"),
            };
            let sid = match self.table.arena[holder].sample_heap.peek() {
                Some(id) => id,
                None => panic!(
                    "invariant violated: record {} in backup heap with no primary samplers",
                    holder
                ),
            };
            let due = self.samplers[sid].backup_minus_delay + self.table.arena[holder].count;
            if due > self.count {
                break;
            }
            if due < self.count {
                panic!(
                    "invariant violated: sampler {} backup fire index {} fell behind stream index {}",
                    sid, due, self.count
                );
            }

            let old_backup = self.samplers[sid].backup;
            self.table.dec_backup(old_backup);
            self.table.inc_backup(current);

            let u = self.rng.next_float();
            let backup_count = self.table.arena[current].count;
            {
                let s = &mut self.samplers[sid];
                s.t1 -= u * (s.t1 - s.t0);
                s.backup = current;
                s.val_backup = backup_count;
            }
            // Only the backup wait is redrawn, from the updated t1 - t0.
            let primary = self.samplers[sid].primary;
            let primary_count = self.table.arena[primary].count;
            let r1 = self.rng.next_float();
            reset_backup_wait(&mut self.samplers[sid], self.count, primary_count, r1);

            let pos = self.samplers[sid].primary_pos;
            self.table.arena[primary]
                .sample_heap
                .restore_at(&mut self.samplers, pos);
            let bpos = self.table.arena[primary].backup_pos;
            self.backup_heap
                .restore_at(&mut self.table.arena, &self.samplers, bpos);
        }
    }

    /// Combine the samplers into the entropy estimate. Non-destructive; the
    /// estimator can keep consuming tokens afterwards.
    pub fn finalize(&self) -> f64 {
        let m = self.count;
        if m == 0 || !self.two_distinct_tokens {
            return 0.0;
        }
        let (max_token, max_count) = self.sketch.save_max();
        let heavy = max_count > m / 2;
        debug!(max_token, max_count, heavy, "finalizing entropy estimate");

        if heavy {
            // A token occupies more than half the stream: estimate the rest
            // of the distribution from the backup samples of the samplers
            // stuck on it, and fold its own contribution in exactly.
            let p_max = max_count as f64 / m as f64;
            let mut sum = 0.0;
            for s in &self.samplers {
                let r = if self.table.arena[s.primary].key == max_token {
                    self.table.arena[s.backup].count - s.val_backup + 1
                } else {
                    self.table.arena[s.primary].count - s.val_primary + 1
                };
                sum += x_term(r, m);
            }
            let avg = sum / self.c as f64;
            (1.0 - p_max) * avg + p_max * (1.0 / p_max).log2()
        } else {
            let mut sum = 0.0;
            for s in &self.samplers {
                let r = self.table.arena[s.primary].count - s.val_primary + 1;
                sum += x_term(r, m);
            }
            sum / self.c as f64
        }
    }

    /// Memory footprint in bytes: the estimator itself, the sampler array,
    /// and each component's array storage plus per-record payload.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.samplers.capacity() * std::mem::size_of::<Sampler>()
            + self.sketch.size_bytes()
            + self.table.size_bytes()
            + self.prim_heap.capacity() * std::mem::size_of::<Reverse<(i64, SamplerId)>>()
            + self.backup_heap.bytes()
    }
}

#[cfg(test)]
impl Estimator {
    /// Walk every structure and assert the quantified invariants that must
    /// hold between updates. Test-only; the hot path never pays for this.
    pub(crate) fn check_invariants(&self) {
        if !self.two_distinct_tokens {
            return;
        }

        for (i, s) in self.samplers.iter().enumerate() {
            assert!(
                s.t0 > 0.0 && s.t0 <= s.t1 && s.t1 <= 1.0,
                "sampler {} thresholds out of order: t0={} t1={}",
                i,
                s.t0,
                s.t1
            );
            assert!(
                s.prim >= self.count,
                "sampler {} primary fire index {} behind stream index {}",
                i,
                s.prim,
                self.count
            );
            let heap = &self.table.arena[s.primary].sample_heap;
            assert_eq!(
                heap.ids()[s.primary_pos],
                i,
                "sampler {} position {} not mirrored in its primary's sample heap",
                i,
                s.primary_pos
            );
        }

        let mut primaries = 0u64;
        let mut backups = 0u64;
        for (id, record) in self.table.arena.iter_live() {
            assert!(
                record.processing || record.num_primary > 0 || record.num_backup > 0,
                "record {} is live with no references",
                id
            );
            assert_eq!(
                record.num_primary as usize,
                record.sample_heap.len(),
                "record {} sample heap size disagrees with its refcount",
                id
            );
            if record.num_primary > 0 {
                assert_ne!(record.backup_pos, NONE, "record {} missing from backup heap", id);
                assert_eq!(
                    self.backup_heap.ids()[record.backup_pos],
                    id,
                    "record {} backup-heap slot not mirrored",
                    id
                );
            } else {
                assert_eq!(record.backup_pos, NONE, "record {} stale backup position", id);
            }
            primaries += record.num_primary as u64;
            backups += record.num_backup as u64;
        }
        assert_eq!(primaries, self.c as u64, "primary references must total c");
        assert_eq!(backups, self.c as u64, "backup references must total c");

        let ids = self.backup_heap.ids();
        for pos in 1..ids.len() {
            let parent = (pos - 1) / 2;
            assert!(
                BackupHeap::key(&self.table.arena, &self.samplers, ids[parent])
                    <= BackupHeap::key(&self.table.arena, &self.samplers, ids[pos]),
                "backup heap property broken between {} and {}",
                parent,
                pos
            );
        }

        let mut seen = vec![false; self.c];
        for &Reverse((_, sid)) in self.prim_heap.iter() {
            assert!(!seen[sid], "sampler {} queued twice in the primary heap", sid);
            seen[sid] = true;
        }
        assert!(
            seen.iter().all(|&s| s),
            "every sampler must be queued in the primary heap"
        );
    }
}
