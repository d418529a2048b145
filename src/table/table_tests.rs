use super::*;
use crate::heaps::BackupHeap;

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

#[test]
fn test_touch_counts_occurrences() {
    let mut table = CounterTable::new(8);
    let id = table.touch(42);
    assert_eq!(table.arena[id].count, 1);
    assert!(table.arena[id].processing);

    let again = table.touch(42);
    assert_eq!(again, id, "same token must resolve to the same record");
    assert_eq!(table.arena[id].count, 2);
    assert_eq!(table.lookup(42), Some(2));
    assert_eq!(table.lookup(7), None);
}

#[test]
fn test_done_processing_frees_unreferenced_record() {
    let mut table = CounterTable::new(8);
    let id = table.touch(1);
    assert_eq!(table.tracked(), 1);

    table.done_processing(id);
    assert_eq!(table.tracked(), 0, "unsampled record must be freed");
    assert_eq!(table.lookup(1), None);
}

#[test]
fn test_backup_reference_keeps_record_alive() {
    let mut table = CounterTable::new(8);
    let id = table.touch(1);
    table.inc_backup(id);
    table.done_processing(id);
    assert_eq!(table.tracked(), 1, "backup-referenced record must survive");

    table.dec_backup(id);
    assert_eq!(table.tracked(), 0, "last reference gone, record freed");
}

#[test]
fn test_primary_lifecycle_through_heaps() {
    let mut table = CounterTable::new(8);
    let mut bheap = BackupHeap::with_capacity(4);
    let mut samplers = samplers_with_delays(&[5, 3]);

    let first = table.touch(10);
    table.inc_primary(first, 0, &mut bheap, &mut samplers);
    assert_eq!(bheap.peek(), Some(first));
    assert_eq!(table.arena[first].backup_pos, 0);
    assert_eq!(samplers[0].primary_pos, 0);

    let second = table.touch(20);
    table.inc_primary(second, 1, &mut bheap, &mut samplers);
    // key(first) = 1 + 5, key(second) = 1 + 3: the second record is due first.
    assert_eq!(bheap.peek(), Some(second));
    assert_eq!(bheap.len(), 2);

    // Releasing the only primary sampler removes the record from the backup
    // heap; the processing pin keeps it alive until the update finishes.
    table.dec_primary(second, 1, &mut bheap, &mut samplers);
    assert_eq!(bheap.len(), 1);
    assert_eq!(bheap.peek(), Some(first));
    assert_eq!(table.tracked(), 2);
    assert_eq!(samplers[1].primary_pos, crate::NONE);

    table.done_processing(second);
    assert_eq!(table.tracked(), 1, "unpinned unreferenced record freed");

    table.done_processing(first);
    assert_eq!(table.tracked(), 1, "primary-referenced record survives");

    table.dec_primary(first, 0, &mut bheap, &mut samplers);
    assert!(bheap.is_empty());
    assert_eq!(table.tracked(), 0);
}

#[test]
fn test_freed_slots_are_reused() {
    let mut table = CounterTable::new(4);
    let a = table.touch(1);
    table.done_processing(a);
    let b = table.touch(2);
    assert_eq!(a, b, "freed arena slot should be reused");
    assert_eq!(table.tracked(), 1);
    assert_eq!(table.lookup(1), None);
    assert_eq!(table.lookup(2), Some(1));
}

#[test]
fn test_collision_chains_stay_consistent() {
    // Two buckets force long chains.
    let mut table = CounterTable::new(2);
    let ids: Vec<_> = (0..32).map(|t| table.touch(t)).collect();
    for (t, &id) in ids.iter().enumerate() {
        assert_eq!(table.arena[id].key, t as i32);
        assert_eq!(table.lookup(t as i32), Some(1));
    }

    // Free every other record and re-check the survivors' chains.
    for (t, &id) in ids.iter().enumerate() {
        if t % 2 == 0 {
            table.done_processing(id);
        }
    }
    for t in 0..32 {
        let expected = if t % 2 == 0 { None } else { Some(1) };
        assert_eq!(table.lookup(t), expected, "token {} after partial free", t);
    }
}

#[test]
fn test_size_reporting_tracks_storage() {
    let mut table = CounterTable::new(64);
    let empty = table.size_bytes();
    for t in 0..100 {
        table.touch(t);
    }
    assert!(
        table.size_bytes() > empty,
        "storing 100 records must grow the reported footprint"
    );
}
