//! Resolved package and per-platform resolution types.
//!
//! These are the normalized shapes every solver adapter produces. They are
//! immutable once handed out of the adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{Category, Platform};
use crate::error::{LockError, LockResult};

/// Digest algorithm of an artifact hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Hex length of a digest produced by this algorithm
    fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

/// Cryptographic digest of a package artifact, rendered as `algo:hex`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactHash {
    pub algorithm: HashAlgorithm,
    value: String,
}

impl ArtifactHash {
    /// Create a hash from a hex digest, normalizing to lowercase
    pub fn new(algorithm: HashAlgorithm, hex_digest: &str) -> LockResult<Self> {
        let value = hex_digest.trim().to_ascii_lowercase();
        if value.len() != algorithm.hex_len() || hex::decode(&value).is_err() {
            return Err(LockError::IntegrityFailure {
                subject: format!("{} digest", algorithm.as_str()),
                expected: format!("{} hex characters", algorithm.hex_len()),
                actual: hex_digest.to_string(),
            });
        }
        Ok(Self { algorithm, value })
    }

    pub fn sha256(hex_digest: &str) -> LockResult<Self> {
        Self::new(HashAlgorithm::Sha256, hex_digest)
    }

    pub fn md5(hex_digest: &str) -> LockResult<Self> {
        Self::new(HashAlgorithm::Md5, hex_digest)
    }

    /// The bare hex digest
    pub fn hex(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.value)
    }
}

impl FromStr for ArtifactHash {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, digest) = s.split_once(':').ok_or_else(|| LockError::IntegrityFailure {
            subject: "artifact hash".to_string(),
            expected: "algo:hex".to_string(),
            actual: s.to_string(),
        })?;
        let algorithm = match algorithm {
            "md5" => HashAlgorithm::Md5,
            "sha256" => HashAlgorithm::Sha256,
            other => {
                return Err(LockError::IntegrityFailure {
                    subject: "artifact hash".to_string(),
                    expected: "md5 or sha256".to_string(),
                    actual: other.to_string(),
                })
            }
        };
        Self::new(algorithm, digest)
    }
}

impl TryFrom<String> for ArtifactHash {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactHash> for String {
    fn from(hash: ArtifactHash) -> Self {
        hash.to_string()
    }
}

/// A concrete package chosen by a solver for one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub build: String,
    pub channel: String,
    /// Subdir the artifact was built for; `noarch` packages keep `noarch`
    pub platform: Platform,
    #[serde(default)]
    pub category: Category,
    pub hash: ArtifactHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Names of required packages, for provenance only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
}

impl ResolvedPackage {
    /// Total ordering key: name, version, build, then remaining fields lexically
    pub fn sort_key(&self) -> (&str, &str, &str, &str, &str, &str, &str) {
        (
            &self.name,
            &self.version,
            &self.build,
            &self.channel,
            self.platform.as_str(),
            self.category.as_str(),
            self.hash.hex(),
        )
    }

    /// `name==version=build` identifier used in reports
    pub fn pin(&self) -> String {
        format!("{}=={}={}", self.name, self.version, self.build)
    }
}

/// What ran to produce a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverMetadata {
    pub name: String,
    pub version: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// The full package set one solver invocation produced for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResolution {
    pub platform: Platform,
    pub packages: Vec<ResolvedPackage>,
    pub solver: SolverMetadata,
}

/// Per-platform outcomes of a resolution run, keyed by requested platform
pub type PlatformOutcomes = BTreeMap<Platform, LockResult<PlatformResolution>>;
