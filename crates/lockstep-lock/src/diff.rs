//! Structural comparison of two lock documents, for reporting only

use std::collections::BTreeMap;
use std::fmt;

use lockstep_core::{Category, Platform, ResolvedPackage};
use serde::Serialize;

use crate::document::LockDocument;

/// A package present in both documents whose pin changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageChange {
    pub name: String,
    pub category: Category,
    /// `version=build` before
    pub from: String,
    /// `version=build` after
    pub to: String,
}

/// Package level changes on one platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformDiff {
    pub added: Vec<ResolvedPackage>,
    pub removed: Vec<ResolvedPackage>,
    pub changed: Vec<PackageChange>,
}

impl PlatformDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Differences between a previous and a new lock document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockDiff {
    pub added_platforms: Vec<Platform>,
    pub removed_platforms: Vec<Platform>,
    /// Only platforms locked in both documents that changed
    pub platforms: BTreeMap<Platform, PlatformDiff>,
}

impl LockDiff {
    /// Compare two documents; packages are matched on (category, name)
    pub fn between(previous: &LockDocument, current: &LockDocument) -> Self {
        let mut diff = LockDiff::default();

        for platform in current.platforms().keys() {
            if previous.platform(platform).is_none() {
                diff.added_platforms.push(platform.clone());
            }
        }
        for (platform, old) in previous.platforms() {
            let Some(new) = current.platform(platform) else {
                diff.removed_platforms.push(platform.clone());
                continue;
            };
            let platform_diff = diff_packages(&old.packages, &new.packages);
            if !platform_diff.is_empty() {
                diff.platforms.insert(platform.clone(), platform_diff);
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_platforms.is_empty()
            && self.removed_platforms.is_empty()
            && self.platforms.is_empty()
    }
}

fn diff_packages(old: &[ResolvedPackage], new: &[ResolvedPackage]) -> PlatformDiff {
    let key = |p: &ResolvedPackage| (p.category.clone(), p.name.clone());
    let old_by_key: BTreeMap<_, _> = old.iter().map(|p| (key(p), p)).collect();
    let new_by_key: BTreeMap<_, _> = new.iter().map(|p| (key(p), p)).collect();

    let mut diff = PlatformDiff::default();
    for (k, new_pkg) in &new_by_key {
        match old_by_key.get(k) {
            None => diff.added.push((*new_pkg).clone()),
            Some(old_pkg) if old_pkg != new_pkg => diff.changed.push(PackageChange {
                name: new_pkg.name.clone(),
                category: new_pkg.category.clone(),
                from: format!("{}={}", old_pkg.version, old_pkg.build),
                to: format!("{}={}", new_pkg.version, new_pkg.build),
            }),
            Some(_) => {}
        }
    }
    for (k, old_pkg) in &old_by_key {
        if !new_by_key.contains_key(k) {
            diff.removed.push((*old_pkg).clone());
        }
    }
    diff
}

impl fmt::Display for LockDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no changes");
        }
        for platform in &self.added_platforms {
            writeln!(f, "+ platform {}", platform)?;
        }
        for platform in &self.removed_platforms {
            writeln!(f, "- platform {}", platform)?;
        }
        for (platform, diff) in &self.platforms {
            writeln!(f, "{}:", platform)?;
            for package in &diff.added {
                writeln!(f, "  + {} {}={}", package.name, package.version, package.build)?;
            }
            for package in &diff.removed {
                writeln!(f, "  - {} {}={}", package.name, package.version, package.build)?;
            }
            for change in &diff.changed {
                writeln!(f, "  ~ {} {} -> {}", change.name, change.from, change.to)?;
            }
        }
        Ok(())
    }
}
