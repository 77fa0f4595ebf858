//! This module provides deterministic `HashMap` and `HashSet` variants. The hashing data
//! structures in the standard library are randomly seeded, which would make iteration order (and
//! therefore any random draws that depend on it) differ between two runs with the same seed.
//!
//! Use `HashMap::default()` to create a new map with the deterministic hasher.
//!
//! The `hash_str` free function is used in `crate::random` to derive the seed offset of a named
//! random number generator.

use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A convenience method to compute the hash of a `&str`.
#[must_use]
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}
