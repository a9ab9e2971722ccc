//! # lockstep-core
//!
//! Core types and utilities shared across all lockstep crates.
//!
//! This crate provides:
//! - The `LockSpec` model with its constraint grammar and fingerprint
//! - Normalized `ResolvedPackage` / `PlatformResolution` types
//! - `LockError` enum for unified error handling
//! - Blake3 hashing helpers for fingerprints and content hashes
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Platform, ConstraintEntry, ResolvedPackage, etc.)
//! - `spec`: The validated environment specification
//! - `error`: Error types and result aliases
//! - `utils`: Hashing helpers

pub mod error;
pub mod spec;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{LockError, LockResult, PlatformFailure};
pub use spec::LockSpec;
pub use types::{
    ArtifactHash, Category, ConstraintEntry, Platform, PlatformOutcomes, PlatformResolution,
    ResolvedPackage, SolverMetadata, VersionConstraint,
};
pub use utils::Fingerprint;
