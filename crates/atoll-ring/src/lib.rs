//! Weighted consistent hashing over a sorted ring of hash points.
//!
//! This crate implements the continuum: servers are placed on a 32-bit hash
//! ring as many points each, proportionally to their weight, and a key maps
//! to the server owning the first point clockwise from the key's own hash.
//! Adding or removing a server remaps only a small, bounded fraction of
//! keys.
//!
//! Points are derived by MD5-digesting `"{name}-{index}"` labels and
//! splitting each 128-bit digest into four 32-bit values, so placement is
//! fully deterministic: two rings built from the same server set agree on
//! every mapping.
//!
//! [`ContinuumBuilder`] turns a weighted server set into an immutable
//! [`Ring`] snapshot; [`Continuum`] owns the published snapshot and offers
//! lock-free lookup plus membership mutation that rebuilds and atomically
//! swaps the ring.

mod builder;
mod continuum;
mod error;
pub mod hash;

pub use builder::{ContinuumBuilder, POINTS_PER_SERVER, Point, Ring};
pub use continuum::Continuum;
pub use error::RingError;
