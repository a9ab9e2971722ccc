//! Core data types for lockstep.
//!
//! This module provides the fundamental types shared by every crate:
//! - Platform identifiers and dependency categories
//! - The version constraint grammar and constraint entries
//! - Normalized resolved packages and per-platform resolutions

pub mod category;
pub mod constraint;
pub mod package;
pub mod platform;

// Re-export all public types
pub use category::Category;
pub use constraint::{Comparator, ConstraintEntry, Op, VersionConstraint};
pub use package::{
    ArtifactHash, HashAlgorithm, PlatformOutcomes, PlatformResolution, ResolvedPackage,
    SolverMetadata,
};
pub use platform::Platform;
