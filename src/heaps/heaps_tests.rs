use proptest::prelude::*;

use super::*;
use crate::estimator::sampler::Sampler;
use crate::NONE;

fn samplers_with_delays(delays: &[i64]) -> Vec<Sampler> {
    delays
        .iter()
        .map(|&d| {
            let mut s = Sampler::new();
            s.backup_minus_delay = d;
            s
        })
        .collect()
}

/// Heap property + back-index mirror, checked structurally.
fn assert_consistent(heap: &SampleHeap, samplers: &[Sampler]) {
    for (pos, &id) in heap.ids().iter().enumerate() {
        assert_eq!(
            samplers[id].primary_pos, pos,
            "sampler {} does not mirror its slot {}",
            id, pos
        );
        if pos > 0 {
            let parent = heap.ids()[(pos - 1) / 2];
            assert!(
                samplers[parent].backup_minus_delay <= samplers[id].backup_minus_delay,
                "heap property broken at slot {}",
                pos
            );
        }
    }
}

#[test]
fn test_insert_orders_by_delay() {
    let mut samplers = samplers_with_delays(&[50, 10, 30, 20, 40]);
    let mut heap = SampleHeap::with_capacity(4);
    for id in 0..samplers.len() {
        heap.insert(&mut samplers, id);
        assert_consistent(&heap, &samplers);
    }
    assert_eq!(heap.peek(), Some(1), "sampler with delay 10 must be the root");
    assert_eq!(heap.len(), 5);
}

#[test]
fn test_remove_at_root_and_interior() {
    let mut samplers = samplers_with_delays(&[5, 1, 3, 4, 2]);
    let mut heap = SampleHeap::with_capacity(4);
    for id in 0..samplers.len() {
        heap.insert(&mut samplers, id);
    }

    let root = heap.peek().unwrap();
    heap.remove_at(&mut samplers, 0);
    assert_eq!(samplers[root].primary_pos, NONE, "removed sampler unlinked");
    assert_consistent(&heap, &samplers);
    assert_eq!(heap.peek(), Some(4), "next smallest delay takes the root");

    // Interior removal: take out whatever sits at slot 1.
    let interior = heap.ids()[1];
    heap.remove_at(&mut samplers, 1);
    assert_eq!(samplers[interior].primary_pos, NONE);
    assert_consistent(&heap, &samplers);
    assert_eq!(heap.len(), 3);
}

#[test]
fn test_pop_drains_in_delay_order() {
    let mut samplers = samplers_with_delays(&[7, 2, 9, 4]);
    let mut heap = SampleHeap::with_capacity(4);
    for id in 0..samplers.len() {
        heap.insert(&mut samplers, id);
    }

    let mut drained = Vec::new();
    while let Some(id) = heap.pop(&mut samplers) {
        drained.push(samplers[id].backup_minus_delay);
    }
    assert_eq!(drained, vec![2, 4, 7, 9], "pop must yield ascending delays");
    assert!(heap.is_empty());
}

#[test]
fn test_remove_last_slot() {
    let mut samplers = samplers_with_delays(&[1, 2]);
    let mut heap = SampleHeap::with_capacity(2);
    heap.insert(&mut samplers, 0);
    heap.insert(&mut samplers, 1);
    heap.remove_at(&mut samplers, 1);
    assert_eq!(heap.len(), 1);
    assert_eq!(heap.peek(), Some(0));
    assert_consistent(&heap, &samplers);
}

#[test]
fn test_restore_after_key_change() {
    let mut samplers = samplers_with_delays(&[10, 20, 30, 40]);
    let mut heap = SampleHeap::with_capacity(4);
    for id in 0..samplers.len() {
        heap.insert(&mut samplers, id);
    }

    // Push the root's key past everyone: it must sift down.
    samplers[0].backup_minus_delay = 100;
    let pos = samplers[0].primary_pos;
    heap.restore_at(&mut samplers, pos);
    assert_consistent(&heap, &samplers);
    assert_eq!(heap.peek(), Some(1));

    // Pull a leaf's key below everyone: it must sift up.
    samplers[3].backup_minus_delay = -5;
    let pos = samplers[3].primary_pos;
    heap.restore_at(&mut samplers, pos);
    assert_consistent(&heap, &samplers);
    assert_eq!(heap.peek(), Some(3));
}

#[test]
fn test_restore_tolerates_sentinel() {
    let mut samplers = samplers_with_delays(&[1]);
    let mut heap = SampleHeap::with_capacity(1);
    heap.insert(&mut samplers, 0);
    // Must be a no-op, not a panic.
    heap.restore_at(&mut samplers, NONE);
    assert_eq!(heap.peek(), Some(0));
}

#[test]
#[should_panic(expected = "invariant violated")]
fn test_restore_out_of_bounds_aborts() {
    let mut samplers = samplers_with_delays(&[1]);
    let mut heap = SampleHeap::with_capacity(1);
    heap.insert(&mut samplers, 0);
    heap.restore_at(&mut samplers, 3);
}

proptest! {
    /// Under arbitrary interleavings of inserts, removals and key changes,
    /// the heap keeps its property and every back-index mirrors its slot.
    #[test]
    fn prop_sample_heap_stays_consistent(
        delays in proptest::collection::vec(-1000i64..1000, 8),
        ops in proptest::collection::vec((0u8..3, 0usize..8, -1000i64..1000), 1..64),
    ) {
        let mut samplers = samplers_with_delays(&delays);
        let mut heap = SampleHeap::with_capacity(2);
        let mut contained = [false; 8];

        for (op, target, new_delay) in ops {
            match op {
                0 => {
                    if !contained[target] {
                        heap.insert(&mut samplers, target);
                        contained[target] = true;
                    }
                }
                1 => {
                    if contained[target] {
                        let pos = samplers[target].primary_pos;
                        heap.remove_at(&mut samplers, pos);
                        contained[target] = false;
                    }
                }
                _ => {
                    if contained[target] {
                        samplers[target].backup_minus_delay = new_delay;
                        let pos = samplers[target].primary_pos;
                        heap.restore_at(&mut samplers, pos);
                    }
                }
            }
            assert_consistent(&heap, &samplers);

            let expected_min = (0..8)
                .filter(|&i| contained[i])
                .map(|i| samplers[i].backup_minus_delay)
                .min();
            let root_delay = heap.peek().map(|id| samplers[id].backup_minus_delay);
            prop_assert_eq!(root_delay, expected_min);
        }
    }
}
