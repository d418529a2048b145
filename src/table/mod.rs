//! Counter table: one reference-counted record per tracked token.
//!
//! Records live in an arena with stable indices and a freelist; the hash
//! table chains records through link fields inside the records themselves.
//! A record stays alive exactly as long as some sampler references it as a
//! primary or backup sample, or the in-flight update has pinned it via the
//! `processing` flag. The moment all three clear, the slot goes back to the
//! freelist.

use std::ops::{Index, IndexMut};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::estimator::sampler::{Sampler, SamplerId};
use crate::heaps::{BackupHeap, SampleHeap};
use crate::NONE;

pub type CounterId = usize;

/// Mersenne prime modulus of the 2-independent bucket hash.
const MERSENNE_61: u64 = (1 << 61) - 1;

/// Seed of the dedicated generator the hash parameters are drawn from.
/// Fixed so that bucket placement is reproducible across runs.
const HASH_PARAM_SEED: u64 = 0x7ab1_e5ee;

/// Sample heaps start small; almost all records are sampled by few samplers.
const SAMPLE_HEAP_INITIAL: usize = 4;

/// Running state of one tracked token.
#[derive(Debug)]
pub struct CounterRecord {
    pub(crate) key: i32,
    pub(crate) count: i64,
    pub(crate) num_primary: u32,
    pub(crate) num_backup: u32,
    pub(crate) processing: bool,
    /// Samplers whose primary sample is this record.
    pub(crate) sample_heap: SampleHeap,
    /// Slot in the global backup heap, or `NONE`.
    pub(crate) backup_pos: usize,
    next: CounterId,
    prev: CounterId,
    live: bool,
}

/// Slab of counter records with a freelist. Indices are stable for the
/// lifetime of a record; freed slots are reused by later `touch` calls.
#[derive(Debug, Default)]
pub struct CounterArena {
    slots: Vec<CounterRecord>,
    free: Vec<CounterId>,
}

impl Index<CounterId> for CounterArena {
    type Output = CounterRecord;

    fn index(&self, id: CounterId) -> &CounterRecord {
        &self.slots[id]
    }
}

impl IndexMut<CounterId> for CounterArena {
    fn index_mut(&mut self, id: CounterId) -> &mut CounterRecord {
        &mut self.slots[id]
    }
}

impl CounterArena {
    fn alloc(&mut self, key: i32) -> CounterId {
        match self.free.pop() {
            Some(id) => {
                let record = &mut self.slots[id];
                record.key = key;
                record.count = 1;
                record.num_primary = 0;
                record.num_backup = 0;
                record.processing = true;
                record.sample_heap.clear();
                record.backup_pos = NONE;
                record.next = NONE;
                record.prev = NONE;
                record.live = true;
                id
            }
            None => {
                self.slots.push(CounterRecord {
                    key,
                    count: 1,
                    num_primary: 0,
                    num_backup: 0,
                    processing: true,
                    sample_heap: SampleHeap::with_capacity(SAMPLE_HEAP_INITIAL),
                    backup_pos: NONE,
                    next: NONE,
                    prev: NONE,
                    live: true,
                });
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, id: CounterId) {
        self.slots[id].live = false;
        self.free.push(id);
    }

    /// Live records, in arena order. Used by the invariant checks and size
    /// accounting.
    pub(crate) fn iter_live(&self) -> impl Iterator<Item = (CounterId, &CounterRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, record)| record.live)
    }
}

/// Hash table over the arena, sized at construction (2c buckets for the
/// fast estimator) and never resized. Collisions chain through the records'
/// `next`/`prev` fields.
#[derive(Debug)]
pub struct CounterTable {
    pub(crate) arena: CounterArena,
    buckets: Vec<CounterId>,
    hash_a: u64,
    hash_b: u64,
}

impl CounterTable {
    pub fn new(buckets: usize) -> Self {
        let mut param_rng = StdRng::seed_from_u64(HASH_PARAM_SEED);
        Self {
            arena: CounterArena::default(),
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

    /// Record the arrival of `key`: bump its count (creating the record on
    /// first sight) and pin it for the duration of the current update.
    pub fn touch(&mut self, key: i32) -> CounterId {
        let bucket = self.bucket_of(key);
        let mut cursor = self.buckets[bucket];
        while cursor != NONE {
            let record = &mut self.arena[cursor];
            if record.key == key {
                record.count += 1;
                record.processing = true;
                return cursor;
            }
            cursor = record.next;
        }
        let id = self.arena.alloc(key);
        let head = self.buckets[bucket];
        self.arena[id].next = head;
        if head != NONE {
            self.arena[head].prev = id;
        }
        self.buckets[bucket] = id;
        id
    }

    /// Current count of `key`, if tracked.
    pub fn lookup(&self, key: i32) -> Option<i64> {
        let mut cursor = self.buckets[self.bucket_of(key)];
        while cursor != NONE {
            let record = &self.arena[cursor];
            if record.key == key {
                return Some(record.count);
            }
            cursor = record.next;
        }
        None
    }

    /// Register `sampler` as a primary sampler of `id`: joins the record's
    /// sample heap and inserts or restores the record in the backup heap.
    /// Precondition: the sampler's wait times are already set.
    pub fn inc_primary(
        &mut self,
        id: CounterId,
        sampler: SamplerId,
        bheap: &mut BackupHeap,
        samplers: &mut [Sampler],
    ) {
        self.arena[id].num_primary += 1;
        self.arena[id].sample_heap.insert(samplers, sampler);
        if self.arena[id].num_primary == 1 {
            bheap.insert(&mut self.arena, samplers, id);
        } else {
            let pos = self.arena[id].backup_pos;
            bheap.restore_at(&mut self.arena, samplers, pos);
        }
    }

    pub fn inc_backup(&mut self, id: CounterId) {
        self.arena[id].num_backup += 1;
    }

    /// Unregister `sampler` as a primary sampler of `id`. When the last
    /// primary sampler leaves, the record leaves the backup heap; when the
    /// liveness invariant clears, the record is freed on the spot.
    pub fn dec_primary(
        &mut self,
        id: CounterId,
        sampler: SamplerId,
        bheap: &mut BackupHeap,
        samplers: &mut [Sampler],
    ) {
        self.arena[id].num_primary -= 1;
        if self.arena[id].num_primary == 0 {
            let pos = self.arena[id].backup_pos;
            bheap.remove_at(&mut self.arena, samplers, pos);
            let record = &self.arena[id];
            if record.num_backup == 0 && !record.processing {
                self.unlink_and_free(id);
                return;
            }
        }
        let pos = samplers[sampler].primary_pos;
        self.arena[id].sample_heap.remove_at(samplers, pos);
        let bpos = self.arena[id].backup_pos;
        bheap.restore_at(&mut self.arena, samplers, bpos);
    }

    pub fn dec_backup(&mut self, id: CounterId) {
        self.arena[id].num_backup -= 1;
        let record = &self.arena[id];
        if record.num_primary == 0 && record.num_backup == 0 && !record.processing {
            self.unlink_and_free(id);
        }
    }

    /// Release the in-flight pin taken by `touch`.
    pub fn done_processing(&mut self, id: CounterId) {
        self.arena[id].processing = false;
        let record = &self.arena[id];
        if record.num_primary == 0 && record.num_backup == 0 {
            self.unlink_and_free(id);
        }
    }

    /// Number of live records.
    pub fn tracked(&self) -> usize {
        self.arena.iter_live().count()
    }

    /// Storage in bytes: bucket array, arena slots, and the live records'
    /// sample-heap arrays.
    pub fn size_bytes(&self) -> usize {
        let heaps: usize = self
            .arena
            .iter_live()
            .map(|(_, record)| record.sample_heap.bytes())
            .sum();
        std::mem::size_of::<Self>()
            + self.buckets.capacity() * std::mem::size_of::<CounterId>()
            + self.arena.slots.capacity() * std::mem::size_of::<CounterRecord>()
            + self.arena.free.capacity() * std::mem::size_of::<CounterId>()
            + heaps
    }

    fn unlink_and_free(&mut self, id: CounterId) {
        let bucket = self.bucket_of(self.arena[id].key);
        let (prev, next) = (self.arena[id].prev, self.arena[id].next);
        if prev == NONE {
            self.buckets[bucket] = next;
        } else {
            self.arena[prev].next = next;
        }
        if next != NONE {
            self.arena[next].prev = prev;
        }
        self.arena.release(id);
    }
}

#[cfg(test)]
mod table_tests;
