//! Configuration parsing for lockstep
//!
//! This crate handles parsing and validation of lockstep.toml and of the
//! dependency sources a `LockSpec` is built from (environment.yml, meta.yaml
//! and pyproject.toml), providing a unified configuration interface for the
//! resolver and lock crates.

pub mod merge;
pub mod settings;
pub mod sources;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use settings::{LockSection, LockstepToml, ResolveSection, SolverKind, SolverSection};
pub use sources::{parse_source_file, parse_source_files};

use lockstep_core::error::LockError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, LockError>;
