//! Deciding whether an existing lock still reflects its inputs.
//!
//! Checks run in this order: no lock, missing platforms, spec fingerprint,
//! solver versions. Platforms are tested before the fingerprint because
//! the fingerprint covers the platform set, and adding a platform should be
//! reported as such rather than as a generic spec change.

use std::collections::BTreeMap;
use std::fmt;

use lockstep_core::{Fingerprint, LockResult, LockSpec, Platform};
use tracing::debug;

use crate::document::LockDocument;

/// Solver versions available in the current environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentFingerprint {
    solvers: BTreeMap<String, String>,
}

impl EnvironmentFingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.solvers.insert(name.into(), version.into());
        self
    }

    pub fn solver_version(&self, name: &str) -> Option<&str> {
        self.solvers.get(name).map(String::as_str)
    }

    /// Known solvers as `(name, version)`, ordered by name
    pub fn solvers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.solvers.iter().map(|(name, version)| (name.as_str(), version.as_str()))
    }
}

/// Outcome of a staleness check; computed on demand, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessVerdict {
    /// The lock can be reused as is
    Fresh,
    /// No previous lock exists
    Unknown,
    SpecChanged {
        locked: Fingerprint,
        current: Fingerprint,
    },
    /// Spec platforms with no resolution in the lock, including platforms a
    /// degraded lock flagged as missing
    PlatformMissing { missing: Vec<Platform> },
    /// The solver version moved, or a different solver is now in use; in
    /// the latter case `locked` and `current` carry the solver names too
    SolverChanged {
        solver: String,
        locked: String,
        current: String,
    },
}

impl StalenessVerdict {
    pub fn is_fresh(&self) -> bool {
        matches!(self, StalenessVerdict::Fresh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StalenessVerdict::Fresh => "fresh",
            StalenessVerdict::Unknown => "unknown",
            StalenessVerdict::SpecChanged { .. } => "stale-spec-changed",
            StalenessVerdict::PlatformMissing { .. } => "stale-platform-missing",
            StalenessVerdict::SolverChanged { .. } => "stale-solver-changed",
        }
    }
}

impl fmt::Display for StalenessVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalenessVerdict::Fresh | StalenessVerdict::Unknown => f.write_str(self.as_str()),
            StalenessVerdict::SpecChanged { locked, current } => write!(
                f,
                "{}: lock was made for {}, spec is now {}",
                self.as_str(),
                locked.short(),
                current.short()
            ),
            StalenessVerdict::PlatformMissing { missing } => write!(
                f,
                "{}: {}",
                self.as_str(),
                missing.iter().map(Platform::as_str).collect::<Vec<_>>().join(", ")
            ),
            StalenessVerdict::SolverChanged {
                solver,
                locked,
                current,
            } => write!(
                f,
                "{}: {} locked with {}, now {}",
                self.as_str(),
                solver,
                locked,
                current
            ),
        }
    }
}

/// Compare a previous lock against the current spec and environment.
///
/// A solver the environment knows by name is compared by version. When the
/// environment reports solvers but none matches the one recorded, the lock
/// was made by a different solver and is stale. An empty environment gives
/// no signal either way.
pub fn check(
    spec: &LockSpec,
    previous: Option<&LockDocument>,
    environment: &EnvironmentFingerprint,
) -> LockResult<StalenessVerdict> {
    let Some(previous) = previous else {
        return Ok(StalenessVerdict::Unknown);
    };

    let missing: Vec<Platform> = spec
        .platforms()
        .iter()
        .filter(|p| previous.platform(p).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Ok(StalenessVerdict::PlatformMissing { missing });
    }

    let current = spec.fingerprint()?;
    if &current != previous.spec_fingerprint() {
        return Ok(StalenessVerdict::SpecChanged {
            locked: previous.spec_fingerprint().clone(),
            current,
        });
    }

    for (platform, solver) in previous.solvers() {
        if !spec.contains_platform(platform) {
            continue;
        }
        match environment.solver_version(&solver.name) {
            Some(current) if current != solver.version => {
                return Ok(StalenessVerdict::SolverChanged {
                    solver: solver.name.clone(),
                    locked: solver.version.clone(),
                    current: current.to_string(),
                });
            }
            Some(_) => {}
            None => {
                if let Some((name, version)) = environment.solvers().next() {
                    return Ok(StalenessVerdict::SolverChanged {
                        solver: name.to_string(),
                        locked: format!("{} {}", solver.name, solver.version),
                        current: format!("{} {}", name, version),
                    });
                }
            }
        }
    }

    debug!("lock {} is fresh", previous.content_hash().short());
    Ok(StalenessVerdict::Fresh)
}
