//! Slab storage with a few different key flavors.
//!
//! `RawSlab` is the plain free-list slab. `GenSlab` layers a generation counter on every
//! slot so that a stale key is detected instead of silently reading a recycled slot. The
//! registry of live GPU resources is built on `GenSlab`.
//!
//! Most operations are O(1), but there is risk of having to resize a vector. Pre-allocate
//! the size you need with `with_capacity` to avoid this in a shipped build.

/// Scalar type for tracking element generation
///
/// u32 should be enough, even at 120fps, one allocation per frame, it would take
/// more than a year to exhaust
pub type GenerationCounterT = u32;

/// Scalar type for the count of elements of a T
pub type SlabIndexT = u32;

mod gen_slab;
mod generation;
mod raw_slab;

pub use generation::Generation;
pub use generation::GenerationIndex;

pub use raw_slab::RawSlab;
pub use raw_slab::RawSlabKey;

pub use gen_slab::GenSlab;
pub use gen_slab::GenSlabKey;
