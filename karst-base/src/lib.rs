//! Lowest level crate of `karst`. Includes the slab/arena primitives used for resource
//! lifetime bookkeeping.

pub mod slab;
