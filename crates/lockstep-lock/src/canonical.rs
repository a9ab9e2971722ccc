//! Canonical ordering and content hashing of lock contents.
//!
//! The content hash covers the format version, the spec fingerprint, every
//! platform's sorted package list with the solver name and version, and the
//! names of platforms missing from a degraded lock. Timestamps, durations,
//! exit codes and failure reasons are excluded, so two runs that reach the
//! same solution hash identically.

use std::collections::{BTreeMap, BTreeSet};

use lockstep_core::utils::canonical_hash;
use lockstep_core::{Fingerprint, LockResult, Platform, ResolvedPackage};
use serde::Serialize;

use crate::document::PlatformLock;

#[derive(Serialize)]
struct CanonicalLock<'a> {
    format_version: u32,
    spec_fingerprint: &'a Fingerprint,
    platforms: BTreeMap<&'a Platform, CanonicalPlatform<'a>>,
    missing_platforms: BTreeSet<&'a Platform>,
}

#[derive(Serialize)]
struct CanonicalPlatform<'a> {
    solver: &'a str,
    solver_version: &'a str,
    packages: &'a [ResolvedPackage],
}

/// Put a package list into canonical order.
///
/// Dependency names are sorted and de-duplicated, packages are sorted by
/// name, version, build and then the remaining fields, and exact duplicates
/// collapse.
pub fn sort_packages(packages: &mut Vec<ResolvedPackage>) {
    for package in packages.iter_mut() {
        package.depends.sort();
        package.depends.dedup();
    }
    packages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    packages.dedup();
}

/// Hash lock contents that are already in canonical order
pub fn content_hash(
    format_version: u32,
    spec_fingerprint: &Fingerprint,
    platforms: &BTreeMap<Platform, PlatformLock>,
    missing_platforms: &BTreeMap<Platform, String>,
) -> LockResult<Fingerprint> {
    canonical_hash(&CanonicalLock {
        format_version,
        spec_fingerprint,
        platforms: platforms
            .iter()
            .map(|(platform, lock)| {
                (
                    platform,
                    CanonicalPlatform {
                        solver: &lock.solver.name,
                        solver_version: &lock.solver.version,
                        packages: &lock.packages,
                    },
                )
            })
            .collect(),
        missing_platforms: missing_platforms.keys().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{ArtifactHash, Category, SolverMetadata};

    fn package(name: &str, version: &str) -> ResolvedPackage {
        ResolvedPackage {
            name: name.to_string(),
            version: version.to_string(),
            build: "0".to_string(),
            channel: "conda-forge".to_string(),
            platform: Platform::new("linux-64").unwrap(),
            category: Category::main(),
            hash: ArtifactHash::sha256(&"0f".repeat(32)).unwrap(),
            url: None,
            depends: vec!["zlib".to_string(), "openssl".to_string(), "zlib".to_string()],
        }
    }

    fn lock(packages: Vec<ResolvedPackage>, duration_ms: u64) -> PlatformLock {
        PlatformLock {
            solver: SolverMetadata {
                name: "conda".to_string(),
                version: "23.1.0".to_string(),
                duration_ms,
                exit_code: Some(0),
            },
            packages,
        }
    }

    fn fingerprint() -> Fingerprint {
        lockstep_core::utils::blake3_hash(b"spec")
    }

    #[test]
    fn test_sort_packages() {
        let mut packages = vec![package("b", "1.0"), package("a", "2.0"), package("a", "1.10")];
        sort_packages(&mut packages);
        let pins: Vec<String> = packages.iter().map(|p| format!("{}={}", p.name, p.version)).collect();
        // Versions compare lexically
        assert_eq!(pins, vec!["a=1.10", "a=2.0", "b=1.0"]);
        assert_eq!(packages[0].depends, vec!["openssl", "zlib"]);
    }

    #[test]
    fn test_hash_ignores_run_metadata() {
        let linux = Platform::new("linux-64").unwrap();
        let fast = BTreeMap::from([(linux.clone(), lock(vec![package("a", "1")], 10))]);
        let slow = BTreeMap::from([(linux, lock(vec![package("a", "1")], 99_000))]);
        let none = BTreeMap::new();

        assert_eq!(
            content_hash(1, &fingerprint(), &fast, &none).unwrap(),
            content_hash(1, &fingerprint(), &slow, &none).unwrap()
        );
    }

    #[test]
    fn test_hash_covers_missing_platform_names_only() {
        let linux = Platform::new("linux-64").unwrap();
        let win = Platform::new("win-64").unwrap();
        let platforms = BTreeMap::from([(linux, lock(vec![package("a", "1")], 10))]);

        let complete = content_hash(1, &fingerprint(), &platforms, &BTreeMap::new()).unwrap();
        let missing_a = BTreeMap::from([(win.clone(), "timed out".to_string())]);
        let missing_b = BTreeMap::from([(win, "unsatisfiable".to_string())]);
        let degraded_a = content_hash(1, &fingerprint(), &platforms, &missing_a).unwrap();
        let degraded_b = content_hash(1, &fingerprint(), &platforms, &missing_b).unwrap();

        assert_ne!(complete, degraded_a);
        assert_eq!(degraded_a, degraded_b);
    }

    #[test]
    fn test_hash_covers_solver_version_and_format() {
        let linux = Platform::new("linux-64").unwrap();
        let a = BTreeMap::from([(linux.clone(), lock(vec![package("a", "1")], 10))]);
        let mut newer = lock(vec![package("a", "1")], 10);
        newer.solver.version = "24.1.0".to_string();
        let b = BTreeMap::from([(linux, newer)]);
        let none = BTreeMap::new();

        let base = content_hash(1, &fingerprint(), &a, &none).unwrap();
        assert_ne!(base, content_hash(1, &fingerprint(), &b, &none).unwrap());
        assert_ne!(base, content_hash(2, &fingerprint(), &a, &none).unwrap());
    }
}
