//! Fan-out of one solver invocation per platform.
//!
//! Every platform in a spec gets its own task. A semaphore caps how many
//! solver processes run at once, and a shared cancellation token lets the
//! caller abort the whole run. Failures stay scoped to their platform: one
//! platform erroring never stops the others.

use std::sync::Arc;

use lockstep_config::ResolveSection;
use lockstep_core::error::{LockError, PlatformFailure};
use lockstep_core::{LockSpec, Platform, PlatformOutcomes, PlatformResolution};
use lockstep_solver::SolverAdapter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ResolverResult;

/// Drives a solver adapter across all platforms of a spec
pub struct Orchestrator<A> {
    adapter: Arc<A>,
    max_concurrency: usize,
}

/// Per-platform outcomes of one orchestrated run
#[derive(Debug)]
pub struct ResolutionReport {
    outcomes: PlatformOutcomes,
}

impl<A: SolverAdapter + 'static> Orchestrator<A> {
    pub fn new(adapter: A, max_concurrency: usize) -> Self {
        Self::from_arc(Arc::new(adapter), max_concurrency)
    }

    /// Share an adapter that is already reference counted
    pub fn from_arc(adapter: Arc<A>, max_concurrency: usize) -> Self {
        Self {
            adapter,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_section(adapter: Arc<A>, section: &ResolveSection) -> Self {
        Self::from_arc(adapter, section.max_concurrency)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Resolve every platform of `spec`; never fails as a whole
    pub async fn resolve_all(&self, spec: &LockSpec) -> ResolutionReport {
        match self.run(spec, &CancellationToken::new()).await {
            Ok(report) => report,
            // A fresh token is never cancelled
            Err(_) => ResolutionReport::from_outcomes(PlatformOutcomes::new()),
        }
    }

    /// Resolve every platform of `spec` until done or `cancel` fires.
    ///
    /// On cancellation all in-flight workers are aborted, which drops (and
    /// so kills) their solver processes, and the run returns `Cancelled`.
    pub async fn resolve_all_with_cancel(
        &self,
        spec: &LockSpec,
        cancel: &CancellationToken,
    ) -> ResolverResult<ResolutionReport> {
        self.run(spec, cancel).await
    }

    async fn run(&self, spec: &LockSpec, cancel: &CancellationToken) -> ResolverResult<ResolutionReport> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let shared_spec = Arc::new(spec.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = JoinSet::new();

        info!(
            "resolving {} platform(s) with {} (max {} concurrent)",
            spec.platforms().len(),
            self.adapter.name(),
            self.max_concurrency
        );

        for platform in spec.platforms() {
            let adapter = Arc::clone(&self.adapter);
            let spec = Arc::clone(&shared_spec);
            let semaphore = Arc::clone(&semaphore);
            let platform = platform.clone();

            workers.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        debug!("solver slot acquired for {}", platform);
                        adapter.resolve(&spec, &platform).await
                    }
                    Err(_) => Err(LockError::Cancelled),
                };
                (platform, outcome)
            });
        }

        let mut outcomes = PlatformOutcomes::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    warn!("resolution cancelled with {} platform(s) finished", outcomes.len());
                    return Err(LockError::Cancelled);
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok((platform, outcome))) => {
                        match &outcome {
                            Ok(resolution) => info!(
                                "{} resolved: {} package(s) in {}ms",
                                platform,
                                resolution.packages.len(),
                                resolution.solver.duration_ms
                            ),
                            Err(error) => warn!("{} failed: {}", platform, error),
                        }
                        outcomes.insert(platform, outcome);
                    }
                    Some(Err(join_error)) => {
                        warn!("solver worker terminated: {}", join_error);
                    }
                },
            }
        }

        // A worker that panicked left no outcome behind
        for platform in spec.platforms() {
            outcomes.entry(platform.clone()).or_insert_with(|| {
                Err(LockError::SolverProcess {
                    solver: self.adapter.name().to_string(),
                    platform: platform.to_string(),
                    message: "worker terminated unexpectedly".to_string(),
                    exit_code: None,
                })
            });
        }

        Ok(ResolutionReport::from_outcomes(outcomes))
    }
}

impl ResolutionReport {
    pub fn from_outcomes(outcomes: PlatformOutcomes) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &PlatformOutcomes {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> PlatformOutcomes {
        self.outcomes
    }

    pub fn successes(&self) -> impl Iterator<Item = (&Platform, &PlatformResolution)> {
        self.outcomes
            .iter()
            .filter_map(|(platform, outcome)| outcome.as_ref().ok().map(|r| (platform, r)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Platform, &LockError)> {
        self.outcomes
            .iter()
            .filter_map(|(platform, outcome)| outcome.as_ref().err().map(|e| (platform, e)))
    }

    /// Failed platforms with their reasons, in platform order
    pub fn failed_platforms(&self) -> Vec<PlatformFailure> {
        self.failures()
            .map(|(platform, error)| PlatformFailure {
                platform: platform.to_string(),
                reason: error.to_string(),
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{ArtifactHash, Category, ResolvedPackage, SolverMetadata};
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Adapter whose behaviour per platform is scripted by the test
    #[derive(Default)]
    struct FakeSolver {
        unsatisfiable: Vec<&'static str>,
        panics: Vec<&'static str>,
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    fn package(name: &str, platform: &Platform) -> ResolvedPackage {
        ResolvedPackage {
            name: name.to_string(),
            version: "1.0".to_string(),
            build: "h0".to_string(),
            channel: "conda-forge".to_string(),
            platform: platform.clone(),
            category: Category::main(),
            hash: ArtifactHash::sha256(&"ab".repeat(32)).unwrap(),
            url: Some(format!("https://conda.example/{}/{}-1.0-h0.conda", platform, name)),
            depends: Vec::new(),
        }
    }

    impl SolverAdapter for FakeSolver {
        fn name(&self) -> &str {
            "fake"
        }

        fn version(&self) -> impl Future<Output = ResolverResult<String>> + Send {
            async { Ok("1.0.0".to_string()) }
        }

        fn resolve(
            &self,
            _spec: &LockSpec,
            platform: &Platform,
        ) -> impl Future<Output = ResolverResult<PlatformResolution>> + Send {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.running.fetch_sub(1, Ordering::SeqCst);

                if self.panics.iter().any(|p| *p == platform.as_str()) {
                    panic!("solver crashed on {}", platform);
                }
                if self.unsatisfiable.iter().any(|p| *p == platform.as_str()) {
                    return Err(LockError::Unsatisfiable {
                        platform: platform.to_string(),
                        message: "nothing provides tool".to_string(),
                    });
                }
                Ok(PlatformResolution {
                    platform: platform.clone(),
                    packages: vec![package("tool", platform)],
                    solver: SolverMetadata {
                        name: "fake".to_string(),
                        version: "1.0.0".to_string(),
                        duration_ms: self.delay.as_millis() as u64,
                        exit_code: Some(0),
                    },
                })
            }
        }
    }

    fn spec(platforms: &[&str]) -> LockSpec {
        LockSpec::from_match_specs(&["tool>=1.0,<2.0"], vec!["conda-forge".to_string()], platforms)
            .unwrap()
    }

    fn platform(name: &str) -> Platform {
        Platform::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_every_platform_gets_an_outcome() {
        let orchestrator = Orchestrator::new(FakeSolver::default(), 4);
        let report = orchestrator
            .resolve_all(&spec(&["linux-64", "osx-64", "win-64"]))
            .await;

        assert_eq!(report.outcomes().len(), 3);
        assert!(report.is_complete());
        assert_eq!(report.successes().count(), 3);
        assert_eq!(orchestrator.adapter().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_platform() {
        let solver = FakeSolver {
            unsatisfiable: vec!["win-64"],
            ..Default::default()
        };
        let report = Orchestrator::new(solver, 2)
            .resolve_all(&spec(&["linux-64", "osx-64", "win-64"]))
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.successes().count(), 2);
        let failed = report.failed_platforms();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].platform, "win-64");
        assert!(matches!(
            report.outcomes()[&platform("win-64")],
            Err(LockError::Unsatisfiable { .. })
        ));
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_process_failure() {
        let solver = FakeSolver {
            panics: vec!["osx-64"],
            ..Default::default()
        };
        let report = Orchestrator::new(solver, 4)
            .resolve_all(&spec(&["linux-64", "osx-64"]))
            .await;

        assert!(report.outcomes()[&platform("linux-64")].is_ok());
        match &report.outcomes()[&platform("osx-64")] {
            Err(LockError::SolverProcess { message, .. }) => {
                assert_eq!(message, "worker terminated unexpectedly")
            }
            other => panic!("expected process failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let solver = FakeSolver {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(solver, 2);
        let report = orchestrator
            .resolve_all(&spec(&["linux-64", "linux-aarch64", "osx-64", "osx-arm64", "win-64"]))
            .await;

        assert!(report.is_complete());
        let peak = orchestrator.adapter().peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let orchestrator = Orchestrator::new(FakeSolver::default(), 0);
        assert_eq!(orchestrator.max_concurrency(), 1);
        let report = orchestrator.resolve_all(&spec(&["linux-64"])).await;
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_the_run() {
        let solver = FakeSolver {
            delay: Duration::from_secs(30),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(solver, 4);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = orchestrator
            .resolve_all_with_cancel(&spec(&["linux-64", "osx-64"]), &cancel)
            .await;

        assert!(matches!(result, Err(LockError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        // Aborted workers never finished their solver call
        assert_eq!(orchestrator.adapter().running.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_spawns_nothing() {
        let orchestrator = Orchestrator::new(FakeSolver::default(), 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator
            .resolve_all_with_cancel(&spec(&["linux-64"]), &cancel)
            .await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(orchestrator.adapter().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outcomes_do_not_depend_on_completion_order() {
        let a = Orchestrator::new(FakeSolver::default(), 1)
            .resolve_all(&spec(&["win-64", "linux-64", "osx-64"]))
            .await;
        let b = Orchestrator::new(FakeSolver::default(), 3)
            .resolve_all(&spec(&["osx-64", "win-64", "linux-64"]))
            .await;

        let keys = |r: &ResolutionReport| r.outcomes().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&a), keys(&b));

        let packages = |r: ResolutionReport| {
            r.into_outcomes()
                .into_iter()
                .map(|(p, o)| (p, o.unwrap().packages))
                .collect::<BTreeMap<_, _>>()
        };
        assert_eq!(packages(a), packages(b));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const PLATFORMS: [&str; 5] = ["linux-64", "linux-aarch64", "osx-64", "osx-arm64", "win-64"];

        proptest! {
            #[test]
            fn every_requested_platform_gets_exactly_its_outcome(
                requested in proptest::sample::subsequence(PLATFORMS.to_vec(), 1..=5),
                failing in proptest::sample::subsequence(PLATFORMS.to_vec(), 0..=5),
                max_concurrency in 1usize..4,
            ) {
                let solver = FakeSolver {
                    unsatisfiable: failing.clone(),
                    ..Default::default()
                };
                let report = tokio_test::block_on(
                    Orchestrator::new(solver, max_concurrency).resolve_all(&spec(&requested)),
                );

                let keys: Vec<&str> = report.outcomes().keys().map(|p| p.as_str()).collect();
                let mut expected = requested.clone();
                expected.sort();
                prop_assert_eq!(keys, expected);

                for (platform, outcome) in report.outcomes() {
                    prop_assert_eq!(outcome.is_err(), failing.iter().any(|p| *p == platform.as_str()));
                }
            }
        }
    }
}
