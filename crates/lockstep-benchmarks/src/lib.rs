//! Lockstep benchmarking suite
//!
//! Benchmarks for spec parsing, fingerprinting, normalization and lock
//! merging. Solver processes are never spawned; resolutions are synthetic.

pub mod common;

pub use common::*;
