//! The two specialized indexed heaps of the fast estimator.
//!
//! Both are array-backed binary min-heaps whose elements carry the index of
//! their own slot (a back-index), updated on every sift. The back-index is
//! what lets the update protocol restore a single element's position in
//! O(log n) after its key changes, without searching the heap.

mod backup_heap;
mod sample_heap;

pub use backup_heap::BackupHeap;
pub use sample_heap::SampleHeap;

#[cfg(test)]
mod heaps_tests;
