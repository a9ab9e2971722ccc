//! Utility functions and helpers.
//!
//! Common functionality used across multiple lockstep crates.

pub mod hash;

// Re-export commonly used utilities
pub use hash::{blake3_hash, canonical_hash, Fingerprint};
