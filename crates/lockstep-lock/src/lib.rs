//! Lock documents for lockstep
//!
//! This crate owns everything that happens after solvers return:
//! - `merge`: combining per-platform resolutions into one `LockDocument`
//! - `canonical`: the ordering and content hash that make documents comparable
//! - `diff`: structural comparison against a previous document
//! - `staleness`: deciding whether an existing lock can be reused
//! - `persist` and `render`: the TOML lock file and conda explicit files

pub mod canonical;
pub mod diff;
pub mod document;
pub mod merge;
pub mod persist;
pub mod render;
pub mod staleness;

// Re-export main types
pub use diff::{LockDiff, PackageChange, PlatformDiff};
pub use document::{LockDocument, PlatformLock, FORMAT_VERSION};
pub use merge::{LockMerger, MergeOutcome};
pub use persist::LockFile;
pub use render::{lock_filename, render_explicit, write_explicit_files};
pub use staleness::{check, EnvironmentFingerprint, StalenessVerdict};
