use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::NONE;

const MERSENNE_61: u64 = (1 << 61) - 1;

/// Seed of the dedicated generator the sketch hash parameters come from.
const HASH_PARAM_SEED: u64 = 0x4545_4511;

/// Misra-Gries frequent-items sketch over k counters.
///
/// Tallies are kept as grouped doubly-linked lists: groups are ordered by
/// tally and store only the difference to the previous group; the items of a
/// group form a circular ring. Incrementing one counter or decrementing all
/// of them is then O(1) amortized: the global decrement touches a single
/// group differential. A 2k-bucket hash table locates an item's node by
/// token.
///
/// Any token with frequency above m/k survives the stream; `save_max`
/// reports the largest surviving tally for the heavy-hitter branch of the
/// entropy estimators.
#[derive(Debug)]
pub struct MgSketch {
    k: usize,
    items: Vec<ItemNode>,
    free_items: Vec<usize>,
    groups: Vec<GroupNode>,
    free_groups: Vec<usize>,
    /// First (smallest-tally) group, or `NONE` when nothing is tracked.
    first_group: usize,
    buckets: Vec<usize>,
    hash_a: u64,
    hash_b: u64,
}

#[derive(Debug, Clone)]
struct ItemNode {
    token: i32,
    group: usize,
    /// Hash-chain links.
    hnext: usize,
    hprev: usize,
    /// Ring links within the owning group.
    rnext: usize,
    rprev: usize,
}

#[derive(Debug, Clone)]
struct GroupNode {
    /// Tally difference to the previous group (absolute for the first).
    diff: i64,
    /// Any one member of the group's ring.
    members: usize,
    next: usize,
    prev: usize,
}

impl MgSketch {
    pub fn new(k: usize) -> Self {
        let k = k.max(1);
        let mut param_rng = StdRng::seed_from_u64(HASH_PARAM_SEED);
        Self {
            k,
            items: vec![
                ItemNode {
                    token: 0,
                    group: NONE,
                    hnext: NONE,
                    hprev: NONE,
                    rnext: NONE,
                    rprev: NONE,
                };
                k
            ],
            free_items: (0..k).rev().collect(),
            groups: Vec::with_capacity(k + 1),
            free_groups: Vec::new(),
            first_group: NONE,
            buckets: vec![NONE; 2 * k],
            hash_a: param_rng.gen_range(1..MERSENNE_61),
            hash_b: param_rng.gen_range(0..MERSENNE_61),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Feed one token.
    pub fn update(&mut self, token: i32) {
        if let Some(item) = self.find(token) {
            self.increment(item);
        } else if let Some(slot) = self.free_items.pop() {
            self.install(slot, token);
        } else {
            self.decrement_all();
        }
    }

    /// The (token, tally) pair with the largest surviving tally, or (0, 0)
    /// when nothing survived.
    pub fn save_max(&self) -> (i32, i64) {
        if self.first_group == NONE {
            return (0, 0);
        }
        let mut tally = 0;
        let mut group = self.first_group;
        loop {
            tally += self.groups[group].diff;
            if self.groups[group].next == NONE {
                break;
            }
            group = self.groups[group].next;
        }
        (self.items[self.groups[group].members].token, tally)
    }

    /// Number of tokens currently tracked.
    pub fn tracked(&self) -> usize {
        self.k - self.free_items.len()
    }

    /// Current tally of `token`, if tracked. Test and inspection helper.
    pub fn tally(&self, token: i32) -> Option<i64> {
        let item = self.find(token)?;
        let mut tally = 0;
        let mut group = self.first_group;
        while group != NONE {
            tally += self.groups[group].diff;
            if group == self.items[item].group {
                return Some(tally);
            }
            group = self.groups[group].next;
        }
        None
    }

    /// Storage in bytes, for size reporting.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.items.capacity() * std::mem::size_of::<ItemNode>()
            + self.free_items.capacity() * std::mem::size_of::<usize>()
            + self.groups.capacity() * std::mem::size_of::<GroupNode>()
            + self.free_groups.capacity() * std::mem::size_of::<usize>()
            + self.buckets.capacity() * std::mem::size_of::<usize>()
    }

    // ---- hash table ----

    fn bucket_of(&self, token: i32) -> usize {
        let x = token as u32 as u128;
        let h = (self.hash_a as u128 * x + self.hash_b as u128) % MERSENNE_61 as u128;
        (h % self.buckets.len() as u128) as usize
    }

    fn find(&self, token: i32) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(token)];
        while cursor != NONE {
            if self.items[cursor].token == token {
                return Some(cursor);
            }
            cursor = self.items[cursor].hnext;
        }
        None
    }

    fn hash_insert(&mut self, item: usize, token: i32) {
        let bucket = self.bucket_of(token);
        let head = self.buckets[bucket];
        self.items[item].token = token;
        self.items[item].hnext = head;
        self.items[item].hprev = NONE;
        if head != NONE {
            self.items[head].hprev = item;
        }
        self.buckets[bucket] = item;
    }

    fn hash_remove(&mut self, item: usize) {
        let bucket = self.bucket_of(self.items[item].token);
        let (prev, next) = (self.items[item].hprev, self.items[item].hnext);
        if prev == NONE {
            self.buckets[bucket] = next;
        } else {
            self.items[prev].hnext = next;
        }
        if next != NONE {
            self.items[next].hprev = prev;
        }
    }

    // ---- group list ----

    fn alloc_group(&mut self, diff: i64) -> usize {
        match self.free_groups.pop() {
            Some(id) => {
                let group = &mut self.groups[id];
                group.diff = diff;
                group.members = NONE;
                group.next = NONE;
                group.prev = NONE;
                id
            }
            None => {
                self.groups.push(GroupNode {
                    diff,
                    members: NONE,
                    next: NONE,
                    prev: NONE,
                });
                self.groups.len() - 1
            }
        }
    }

    fn release_group(&mut self, id: usize) {
        self.free_groups.push(id);
    }

    /// New token enters with tally 1: join the first group if its absolute
    /// tally is 1, else open a new first group (taking 1 off the previous
    /// first group's differential).
    fn install(&mut self, item: usize, token: i32) {
        self.hash_insert(item, token);
        if self.first_group != NONE && self.groups[self.first_group].diff == 1 {
            self.ring_insert(item, self.first_group);
        } else {
            let old_first = self.first_group;
            let group = self.alloc_group(1);
            self.groups[group].next = old_first;
            if old_first != NONE {
                self.groups[old_first].prev = group;
                self.groups[old_first].diff -= 1;
            }
            self.first_group = group;
            self.ring_insert(item, group);
        }
    }

    /// Tracked token seen again: its tally rises by one, which moves the
    /// item one group up (merging, splitting, or bumping groups as needed,
    /// always keeping the differentials consistent).
    fn increment(&mut self, item: usize) {
        let group = self.items[item].group;
        let next = self.groups[group].next;
        if next != NONE && self.groups[next].diff == 1 {
            // Target group already exists one step up.
            if self.ring_is_singleton(item) {
                // The old group empties: fold its differential into the
                // target and drop it.
                let diff = self.groups[group].diff;
                self.groups[next].diff += diff;
                self.unlink_group(group);
                self.release_group(group);
            } else {
                self.ring_remove(item);
            }
            self.ring_insert(item, next);
        } else if self.ring_is_singleton(item) {
            // Alone in the group: bump the group itself.
            self.groups[group].diff += 1;
            if next != NONE {
                self.groups[next].diff -= 1;
            }
        } else {
            // Split off a new group one step up.
            self.ring_remove(item);
            let split = self.alloc_group(1);
            self.groups[split].prev = group;
            self.groups[split].next = next;
            self.groups[group].next = split;
            if next != NONE {
                self.groups[next].prev = split;
                self.groups[next].diff -= 1;
            }
            self.ring_insert(item, split);
        }
    }

    /// All counters full and an untracked token arrived: every tally drops
    /// by one. Only the first group's differential moves; a zeroed first
    /// group releases its items back to the pool.
    fn decrement_all(&mut self) {
        if self.first_group == NONE {
            return;
        }
        let first = self.first_group;
        self.groups[first].diff -= 1;
        if self.groups[first].diff > 0 {
            return;
        }
        // Drop every item of the zeroed group.
        let mut cursor = self.groups[first].members;
        loop {
            let next = self.items[cursor].rnext;
            self.hash_remove(cursor);
            self.free_items.push(cursor);
            if next == cursor || next == self.groups[first].members {
                break;
            }
            cursor = next;
        }
        self.first_group = self.groups[first].next;
        if self.first_group != NONE {
            self.groups[self.first_group].prev = NONE;
        }
        self.release_group(first);
    }

    fn unlink_group(&mut self, group: usize) {
        let (prev, next) = (self.groups[group].prev, self.groups[group].next);
        if prev == NONE {
            self.first_group = next;
        } else {
            self.groups[prev].next = next;
        }
        if next != NONE {
            self.groups[next].prev = prev;
        }
    }

    // ---- item rings ----

    fn ring_is_singleton(&self, item: usize) -> bool {
        self.items[item].rnext == item
    }

    fn ring_insert(&mut self, item: usize, group: usize) {
        self.items[item].group = group;
        let head = self.groups[group].members;
        if head == NONE {
            self.items[item].rnext = item;
            self.items[item].rprev = item;
            self.groups[group].members = item;
        } else {
            let tail = self.items[head].rprev;
            self.items[item].rnext = head;
            self.items[item].rprev = tail;
            self.items[tail].rnext = item;
            self.items[head].rprev = item;
        }
    }

    fn ring_remove(&mut self, item: usize) {
        let (rprev, rnext) = (self.items[item].rprev, self.items[item].rnext);
        let group = self.items[item].group;
        if self.groups[group].members == item {
            self.groups[group].members = rnext;
        }
        self.items[rprev].rnext = rnext;
        self.items[rnext].rprev = rprev;
        self.items[item].rnext = item;
        self.items[item].rprev = item;
    }
}
