//! The lock document value

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lockstep_core::error::LockError;
use lockstep_core::{Fingerprint, LockResult, Platform, ResolvedPackage, SolverMetadata};
use serde::{Deserialize, Serialize};

use crate::canonical::content_hash;

/// Version of the lock document layout and of its canonical hash input
pub const FORMAT_VERSION: u32 = 1;

/// One platform's pinned packages and the solver run that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLock {
    pub solver: SolverMetadata,
    #[serde(default)]
    pub packages: Vec<ResolvedPackage>,
}

/// A canonical, content-addressed, per-platform lock.
///
/// Documents are immutable values: the merger builds them, and re-locking
/// produces a new document rather than editing an existing one. Field order
/// here is the order written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockDocument {
    format_version: u32,
    spec_fingerprint: Fingerprint,
    generated_at: DateTime<Utc>,
    content_hash: Fingerprint,
    /// Platforms left out of a degraded lock, with the reason each failed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    missing_platforms: BTreeMap<Platform, String>,
    platforms: BTreeMap<Platform, PlatformLock>,
}

impl LockDocument {
    /// Assemble a document from canonically ordered parts and hash it
    pub(crate) fn new(
        spec_fingerprint: Fingerprint,
        platforms: BTreeMap<Platform, PlatformLock>,
        missing_platforms: BTreeMap<Platform, String>,
        generated_at: DateTime<Utc>,
    ) -> LockResult<Self> {
        let content_hash = content_hash(
            FORMAT_VERSION,
            &spec_fingerprint,
            &platforms,
            &missing_platforms,
        )?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            spec_fingerprint,
            generated_at,
            content_hash,
            missing_platforms,
            platforms,
        })
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn spec_fingerprint(&self) -> &Fingerprint {
        &self.spec_fingerprint
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Identity of the document's contents; the timestamp is not part of it
    pub fn content_hash(&self) -> &Fingerprint {
        &self.content_hash
    }

    pub fn platforms(&self) -> &BTreeMap<Platform, PlatformLock> {
        &self.platforms
    }

    pub fn platform(&self, platform: &Platform) -> Option<&PlatformLock> {
        self.platforms.get(platform)
    }

    pub fn missing_platforms(&self) -> &BTreeMap<Platform, String> {
        &self.missing_platforms
    }

    pub fn is_degraded(&self) -> bool {
        !self.missing_platforms.is_empty()
    }

    /// Solver name and version recorded for each locked platform
    pub fn solvers(&self) -> impl Iterator<Item = (&Platform, &SolverMetadata)> {
        self.platforms.iter().map(|(platform, lock)| (platform, &lock.solver))
    }

    /// Check the stored content hash against a recomputation
    pub fn verify(&self) -> LockResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(LockError::IntegrityFailure {
                subject: "lock format version".to_string(),
                expected: FORMAT_VERSION.to_string(),
                actual: self.format_version.to_string(),
            });
        }
        let actual = content_hash(
            self.format_version,
            &self.spec_fingerprint,
            &self.platforms,
            &self.missing_platforms,
        )?;
        if actual != self.content_hash {
            return Err(LockError::IntegrityFailure {
                subject: "lock content hash".to_string(),
                expected: self.content_hash.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::utils::blake3_hash;

    #[test]
    fn test_verify_detects_tampering() {
        let linux = Platform::new("linux-64").unwrap();
        let platforms = BTreeMap::from([(
            linux,
            PlatformLock {
                solver: SolverMetadata {
                    name: "conda".to_string(),
                    version: "23.1.0".to_string(),
                    duration_ms: 5,
                    exit_code: Some(0),
                },
                packages: Vec::new(),
            },
        )]);
        let document =
            LockDocument::new(blake3_hash(b"spec"), platforms, BTreeMap::new(), Utc::now()).unwrap();
        assert!(document.verify().is_ok());
        assert!(!document.is_degraded());

        let mut tampered = document.clone();
        tampered.spec_fingerprint = blake3_hash(b"other spec");
        assert!(matches!(
            tampered.verify(),
            Err(LockError::IntegrityFailure { .. })
        ));

        let mut future = document;
        future.format_version = FORMAT_VERSION + 1;
        assert!(future.verify().is_err());
    }
}
