//! Shared utilities.
//!
//! Content hashing for recipe fingerprints, bounded subprocess execution and
//! test helpers.

pub mod hash;
pub mod process;

#[cfg(test)]
pub mod testutil;
