//! Resolution orchestration for lockstep
//!
//! This crate fans a `LockSpec` out to one solver invocation per platform,
//! bounded by a concurrency ceiling and a shared cancellation signal, and
//! wires the result through staleness checking and merging.

pub mod orchestrator;
pub mod pipeline;

// Re-export main types
pub use orchestrator::{Orchestrator, ResolutionReport};
pub use pipeline::{lock_environment, lock_environment_with_cancel, run_lock, LockOptions, LockOutcome};
pub use tokio_util::sync::CancellationToken;

use lockstep_core::error::LockError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, LockError>;
