//! Bounded-space frequent-items tracking (Misra-Gries).

mod frequent;

pub use frequent::MgSketch;
