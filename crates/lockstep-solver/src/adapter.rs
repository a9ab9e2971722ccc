//! The uniform contract every solver implements

use std::future::Future;

use lockstep_core::error::LockError;
use lockstep_core::{LockSpec, Platform, PlatformResolution};

use crate::SolverResult;

/// A concrete external solver.
///
/// Implementations touch no shared mutable state: each `resolve` call owns
/// its subprocess from spawn to exit. The returned futures are `Send` so the
/// orchestrator can run one per platform on the runtime.
pub trait SolverAdapter: Send + Sync {
    /// Short solver identity recorded in lock metadata, e.g. `conda`
    fn name(&self) -> &str;

    /// Version string of the underlying solver
    fn version(&self) -> impl Future<Output = SolverResult<String>> + Send;

    /// Resolve `spec` for one of its platforms
    fn resolve(
        &self,
        spec: &LockSpec,
        platform: &Platform,
    ) -> impl Future<Output = SolverResult<PlatformResolution>> + Send;
}

/// Reject platforms the spec does not target
pub fn ensure_platform(spec: &LockSpec, platform: &Platform) -> SolverResult<()> {
    if spec.contains_platform(platform) {
        Ok(())
    } else {
        Err(LockError::invalid_spec(format!(
            "platform {} is not one of the spec platforms",
            platform
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_platform() {
        let spec = LockSpec::from_match_specs(&["zlib"], Vec::new(), &["linux-64"]).unwrap();
        assert!(ensure_platform(&spec, &Platform::new("linux-64").unwrap()).is_ok());

        let err = ensure_platform(&spec, &Platform::new("win-64").unwrap()).unwrap_err();
        assert!(matches!(err, LockError::InvalidSpec { .. }));
    }
}
