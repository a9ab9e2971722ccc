//! The lock pipeline: staleness check, orchestration, merge.

use std::sync::Arc;

use camino::Utf8Path;
use lockstep_config::{LockstepToml, ResolveSection};
use lockstep_core::error::LockError;
use lockstep_core::LockSpec;
use lockstep_lock::{check, EnvironmentFingerprint, LockDiff, LockDocument, LockFile, LockMerger};
use lockstep_solver::{CondaSolver, RetryConfig, Retrying, SolverAdapter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;
use crate::ResolverResult;

/// Knobs for one lock run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Emit a lock even if some platforms fail
    pub allow_degraded: bool,
    /// Keep `dev` constraints in the resolved spec
    pub include_dev: bool,
    pub max_concurrency: usize,
    /// Resolve even when the previous lock is fresh
    pub force: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from_section(&ResolveSection::default())
    }
}

impl LockOptions {
    pub fn from_section(section: &ResolveSection) -> Self {
        Self {
            allow_degraded: section.allow_degraded,
            include_dev: section.include_dev,
            max_concurrency: section.max_concurrency,
            force: false,
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// What a lock run produced
#[derive(Debug, Clone)]
pub enum LockOutcome {
    /// The previous lock still reflects the spec and solver; nothing was resolved
    Fresh,
    /// A new document, with its diff against the previous lock when there was one
    Locked {
        document: LockDocument,
        diff: Option<LockDiff>,
    },
}

impl LockOutcome {
    pub fn document(&self) -> Option<&LockDocument> {
        match self {
            LockOutcome::Fresh => None,
            LockOutcome::Locked { document, .. } => Some(document),
        }
    }
}

/// Lock `spec` with `adapter`, reusing `previous` when it is still fresh
pub async fn lock_environment<A: SolverAdapter + 'static>(
    spec: &LockSpec,
    adapter: Arc<A>,
    previous: Option<&LockDocument>,
    options: &LockOptions,
) -> ResolverResult<LockOutcome> {
    lock_environment_with_cancel(spec, adapter, previous, options, &CancellationToken::new()).await
}

/// [`lock_environment`] with a caller-held cancellation token
pub async fn lock_environment_with_cancel<A: SolverAdapter + 'static>(
    spec: &LockSpec,
    adapter: Arc<A>,
    previous: Option<&LockDocument>,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> ResolverResult<LockOutcome> {
    let spec = if options.include_dev {
        spec.clone()
    } else {
        spec.without_dev()
    };

    if options.force {
        info!("forced relock, skipping staleness check");
    } else {
        let environment = environment_fingerprint(adapter.as_ref()).await;
        let verdict = check(&spec, previous, &environment)?;
        if verdict.is_fresh() {
            info!("lock is fresh, nothing to resolve");
            return Ok(LockOutcome::Fresh);
        }
        info!("relocking: {}", verdict);
    }

    let orchestrator = Orchestrator::from_arc(adapter, options.max_concurrency);
    let report = orchestrator.resolve_all_with_cancel(&spec, cancel).await?;

    let merged = LockMerger::degraded(options.allow_degraded).merge(
        &spec,
        previous,
        report.into_outcomes(),
    )?;

    if let Some(diff) = merged.diff.as_ref().filter(|d| !d.is_empty()) {
        info!("lock changes:\n{}", diff);
    }

    Ok(LockOutcome::Locked {
        document: merged.document,
        diff: merged.diff,
    })
}

/// Solver versions for the staleness check; a solver that cannot report one
/// contributes nothing, so the check falls back to the spec alone
async fn environment_fingerprint<A: SolverAdapter>(adapter: &A) -> EnvironmentFingerprint {
    match adapter.version().await {
        Ok(version) => EnvironmentFingerprint::new().with_solver(adapter.name(), version),
        Err(error) => {
            warn!("could not query {} version: {}", adapter.name(), error);
            EnvironmentFingerprint::new()
        }
    }
}

/// Lock `spec` under `root` as configured: discover the solver, read the
/// previous lock, resolve, and write the new lock atomically.
pub async fn run_lock(
    spec: &LockSpec,
    config: &LockstepToml,
    root: &Utf8Path,
    force: bool,
    cancel: &CancellationToken,
) -> ResolverResult<LockOutcome> {
    let solver = CondaSolver::from_section(&config.solver)?;
    let adapter = Arc::new(Retrying::new(solver, RetryConfig::from_section(&config.solver)));

    let lock_path = root.join(&config.lock.path);
    let previous = match LockFile::read_optional(&lock_path).await {
        Ok(previous) => previous,
        Err(error @ (LockError::IntegrityFailure { .. } | LockError::TomlParse { .. })) => {
            warn!("ignoring unusable lock {}: {}", lock_path, error);
            None
        }
        Err(error) => return Err(error),
    };

    let options = LockOptions::from_section(&config.resolve).forced(force);
    let outcome =
        lock_environment_with_cancel(spec, adapter, previous.as_ref(), &options, cancel).await?;

    if let LockOutcome::Locked { document, .. } = &outcome {
        LockFile::write(&lock_path, document).await?;
    }
    Ok(outcome)
}
