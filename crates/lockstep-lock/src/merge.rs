//! Merging per-platform resolutions into a lock document.
//!
//! The merger is the only producer of [`LockDocument`] values. It enforces
//! completeness (every requested platform resolved, unless degraded output
//! was asked for), canonical package order, and per-platform identity
//! uniqueness before hashing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use lockstep_core::error::{LockError, PlatformFailure};
use lockstep_core::{LockResult, LockSpec, Platform, PlatformOutcomes};
use tracing::{info, warn};

use crate::canonical::sort_packages;
use crate::diff::LockDiff;
use crate::document::{LockDocument, PlatformLock};

/// Combines orchestrator outcomes into a lock document
#[derive(Debug, Clone, Copy, Default)]
pub struct LockMerger {
    allow_degraded: bool,
}

/// A merged document plus its diff against the previous lock, if any
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: LockDocument,
    pub diff: Option<LockDiff>,
}

impl LockMerger {
    /// A merger that requires every platform to resolve
    pub fn new() -> Self {
        Self::default()
    }

    /// A merger that emits degraded locks with failed platforms flagged
    pub fn degraded(allow_degraded: bool) -> Self {
        Self { allow_degraded }
    }

    pub fn allows_degraded(&self) -> bool {
        self.allow_degraded
    }

    /// Merge outcomes for `spec` into a new document.
    ///
    /// Fails with `IncompleteResolution` when a requested platform has no
    /// successful resolution (or when nothing succeeded in degraded mode),
    /// and with `Merge` when the outcomes break an internal invariant.
    pub fn merge(
        &self,
        spec: &LockSpec,
        previous: Option<&LockDocument>,
        outcomes: PlatformOutcomes,
    ) -> LockResult<MergeOutcome> {
        let mut platforms: BTreeMap<Platform, PlatformLock> = BTreeMap::new();
        let mut failed: BTreeMap<Platform, String> = BTreeMap::new();

        for (platform, outcome) in outcomes {
            if !spec.contains_platform(&platform) {
                return Err(LockError::merge(format!(
                    "result for {} which the spec does not request",
                    platform
                )));
            }
            match outcome {
                Ok(resolution) => {
                    if resolution.platform != platform {
                        return Err(LockError::merge(format!(
                            "resolution for {} filed under {}",
                            resolution.platform, platform
                        )));
                    }
                    let mut packages = resolution.packages;
                    sort_packages(&mut packages);
                    check_unique(&platform, &packages)?;
                    platforms.insert(
                        platform,
                        PlatformLock {
                            solver: resolution.solver,
                            packages,
                        },
                    );
                }
                Err(error) => {
                    failed.insert(platform, error.to_string());
                }
            }
        }

        for platform in spec.platforms() {
            if !platforms.contains_key(platform) && !failed.contains_key(platform) {
                failed.insert(platform.clone(), "no resolution was produced".to_string());
            }
        }

        if !failed.is_empty() && (!self.allow_degraded || platforms.is_empty()) {
            return Err(LockError::IncompleteResolution {
                failed: failed
                    .into_iter()
                    .map(|(platform, reason)| PlatformFailure {
                        platform: platform.to_string(),
                        reason,
                    })
                    .collect(),
            });
        }
        for (platform, reason) in &failed {
            warn!("degraded lock: {} is missing ({})", platform, reason);
        }

        let document = LockDocument::new(spec.fingerprint()?, platforms, failed, Utc::now())?;
        info!(
            "merged lock for {} platform(s), content hash {}",
            document.platforms().len(),
            document.content_hash().short()
        );

        let diff = previous.map(|previous| LockDiff::between(previous, &document));
        Ok(MergeOutcome { document, diff })
    }
}

/// Package names must be unique per category within a platform
fn check_unique(platform: &Platform, packages: &[lockstep_core::ResolvedPackage]) -> LockResult<()> {
    let mut seen = BTreeSet::new();
    for package in packages {
        if !seen.insert((package.category.as_str(), package.name.as_str())) {
            return Err(LockError::merge(format!(
                "{} resolved more than once in category {} on {}",
                package.name, package.category, platform
            )));
        }
    }
    Ok(())
}
