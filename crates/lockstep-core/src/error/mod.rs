//! Error types and result aliases for lockstep operations.
//!
//! Provides a unified error type that covers every failure a lock run can
//! produce, from malformed input through solver faults to merge invariants.

use thiserror::Error;

/// A single platform that failed to resolve, with the reason reported for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFailure {
    pub platform: String,
    pub reason: String,
}

impl std::fmt::Display for PlatformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.platform, self.reason)
    }
}

/// Unified error type for all lockstep operations
#[derive(Error, Debug)]
pub enum LockError {
    // Spec errors
    #[error("Invalid spec: {reason}")]
    InvalidSpec { reason: String },

    // Solver errors
    #[error("Solver '{solver}' timed out after {timeout_secs}s on {platform}")]
    SolverTimeout {
        solver: String,
        platform: String,
        timeout_secs: u64,
    },

    #[error("Solver '{solver}' failed on {platform}: {message}")]
    SolverProcess {
        solver: String,
        platform: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("No solution exists for {platform}: {message}")]
    Unsatisfiable { platform: String, message: String },

    #[error("Could not parse output of solver '{solver}' for {platform}: {message}")]
    SolverOutputParse {
        solver: String,
        platform: String,
        message: String,
    },

    // Merge errors
    #[error(
        "Resolution incomplete, {} platform(s) failed: {}",
        .failed.len(),
        .failed.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    IncompleteResolution { failed: Vec<PlatformFailure> },

    #[error("Lock merge invariant violated: {message}")]
    Merge { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Config errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Failed to parse {file}: {message}")]
    TomlParse { file: String, message: String },

    #[error("Failed to parse {file}: {message}")]
    YamlParse { file: String, message: String },

    // Integrity errors
    #[error("Integrity check failed for {subject}: expected {expected}, got {actual}")]
    IntegrityFailure {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for lockstep operations
pub type LockResult<T> = Result<T, LockError>;

impl LockError {
    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create an invalid spec error
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    /// Create a merge invariant error
    pub fn merge(message: impl Into<String>) -> Self {
        Self::Merge {
            message: message.into(),
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::SolverTimeout { .. } | LockError::SolverProcess { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            LockError::InvalidSpec { .. } => {
                Some("Check the package names and version constraints in your spec")
            }
            LockError::Unsatisfiable { .. } => {
                Some("Relax the version constraints or add a channel that provides the package")
            }
            LockError::SolverTimeout { .. } => {
                Some("Increase solver.timeout-secs in lockstep.toml or reduce the spec")
            }
            LockError::SolverOutputParse { .. } => {
                Some("The solver version may be unsupported; try a different solver kind")
            }
            LockError::IncompleteResolution { .. } => {
                Some("Fix the failing platforms or set resolve.allow-degraded = true")
            }
            LockError::Merge { .. } => Some("This is a bug, please report it"),
            LockError::IntegrityFailure { .. } => {
                Some("The lock file was modified by hand; re-run the lock")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = LockError::SolverTimeout {
            solver: "conda".to_string(),
            platform: "linux-64".to_string(),
            timeout_secs: 30,
        };
        let process = LockError::SolverProcess {
            solver: "conda".to_string(),
            platform: "linux-64".to_string(),
            message: "segfault".to_string(),
            exit_code: Some(139),
        };
        let unsat = LockError::Unsatisfiable {
            platform: "linux-64".to_string(),
            message: "nothing provides tool".to_string(),
        };

        assert!(timeout.is_retryable());
        assert!(process.is_retryable());
        assert!(!unsat.is_retryable());
        assert!(!LockError::invalid_spec("empty name").is_retryable());
        assert!(!LockError::Cancelled.is_retryable());
    }

    #[test]
    fn test_incomplete_resolution_lists_platforms() {
        let error = LockError::IncompleteResolution {
            failed: vec![
                PlatformFailure {
                    platform: "osx-64".to_string(),
                    reason: "unsatisfiable".to_string(),
                },
                PlatformFailure {
                    platform: "win-64".to_string(),
                    reason: "timed out".to_string(),
                },
            ],
        };

        let message = error.to_string();
        assert!(message.contains("2 platform(s)"));
        assert!(message.contains("osx-64: unsatisfiable"));
        assert!(message.contains("win-64: timed out"));
    }

    #[test]
    fn test_suggestions() {
        assert!(LockError::merge("duplicate").suggestion().is_some());
        assert!(LockError::Cancelled.suggestion().is_none());
    }
}
