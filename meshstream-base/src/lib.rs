//! Basic data structures and utilities shared by the [`meshstream`] crates.
//!
//! This crate is not intended to be used on its own; it exists so that the general-purpose
//! pieces (the priority queue, timing, coordinate types) can be tested and benchmarked
//! separately from the scheduler that uses them.
//!
//! [`meshstream`]: https://docs.rs/meshstream

// Crate-specific lint settings. (General settings can be found in the workspace manifest.)
#![forbid(unsafe_code)]

pub mod heap;
pub mod math;
pub mod time;
pub mod util;
