//! Solver adapters for lockstep
//!
//! This crate wraps external constraint solvers (conda, mamba, micromamba)
//! behind the `SolverAdapter` trait. An adapter turns a `LockSpec` into a
//! solver invocation for one platform, runs it as a bounded subprocess and
//! normalizes the output into a `PlatformResolution`.

pub mod adapter;
pub mod conda;
pub mod discover;
pub mod normalize;
pub mod process;
pub mod retry;

// Re-export main types
pub use adapter::{ensure_platform, SolverAdapter};
pub use conda::CondaSolver;
pub use discover::discover_solver;
pub use retry::{RetryConfig, Retrying};

use lockstep_core::error::LockError;

/// Result type for solver operations
pub type SolverResult<T> = Result<T, LockError>;
