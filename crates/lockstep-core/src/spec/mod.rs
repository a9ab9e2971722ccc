//! The abstract, platform-agnostic environment specification.
//!
//! A `LockSpec` is validated on construction and on deserialization, so any
//! value of this type is known to be well formed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{LockError, LockResult};
use crate::types::{Category, ConstraintEntry, Platform};
use crate::utils::{canonical_hash, Fingerprint};

/// Version of the canonical form hashed into spec fingerprints
const FINGERPRINT_FORMAT: u32 = 1;

/// Desired packages, channel priority and target platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLockSpec")]
pub struct LockSpec {
    /// Constraint entries in declaration order
    constraints: Vec<ConstraintEntry>,
    /// Channels in priority order, highest first
    channels: Vec<String>,
    platforms: BTreeSet<Platform>,
}

#[derive(Deserialize)]
struct RawLockSpec {
    #[serde(default)]
    constraints: Vec<ConstraintEntry>,
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    platforms: BTreeSet<Platform>,
}

impl TryFrom<RawLockSpec> for LockSpec {
    type Error = LockError;

    fn try_from(raw: RawLockSpec) -> Result<Self, Self::Error> {
        LockSpec::new(raw.constraints, raw.channels, raw.platforms)
    }
}

/// Canonical view hashed into the fingerprint
#[derive(Serialize)]
struct CanonicalSpec<'a> {
    format: u32,
    constraints: &'a [ConstraintEntry],
    channels: &'a [String],
    platforms: &'a BTreeSet<Platform>,
}

impl LockSpec {
    /// Create a validated spec
    pub fn new(
        constraints: Vec<ConstraintEntry>,
        channels: Vec<String>,
        platforms: impl IntoIterator<Item = Platform>,
    ) -> LockResult<Self> {
        let platforms: BTreeSet<Platform> = platforms.into_iter().collect();
        if platforms.is_empty() {
            return Err(LockError::invalid_spec("platform set is empty"));
        }

        // Entries may arrive through serde rather than ConstraintEntry::parse
        constraints.iter().try_for_each(ConstraintEntry::validate)?;

        let mut seen = BTreeSet::new();
        for channel in &channels {
            if channel.trim().is_empty() || channel.chars().any(char::is_whitespace) {
                return Err(LockError::invalid_spec(format!(
                    "invalid channel name '{}'",
                    channel
                )));
            }
            if !seen.insert(channel.as_str()) {
                return Err(LockError::invalid_spec(format!(
                    "channel '{}' listed more than once",
                    channel
                )));
            }
        }

        Ok(Self {
            constraints,
            channels,
            platforms,
        })
    }

    /// Parse match-spec strings into a spec with a single category
    pub fn from_match_specs<S: AsRef<str>>(
        specs: &[S],
        channels: Vec<String>,
        platforms: &[&str],
    ) -> LockResult<Self> {
        let constraints = specs
            .iter()
            .map(|spec| ConstraintEntry::parse(spec.as_ref(), Category::main()))
            .collect::<LockResult<Vec<_>>>()?;
        let platforms = platforms
            .iter()
            .map(|p| Platform::new(*p))
            .collect::<LockResult<Vec<_>>>()?;
        Self::new(constraints, channels, platforms)
    }

    pub fn constraints(&self) -> &[ConstraintEntry] {
        &self.constraints
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn platforms(&self) -> &BTreeSet<Platform> {
        &self.platforms
    }

    pub fn contains_platform(&self, platform: &Platform) -> bool {
        self.platforms.contains(platform)
    }

    /// Distinct categories in use, sorted
    pub fn categories(&self) -> BTreeSet<Category> {
        self.constraints.iter().map(|c| c.category.clone()).collect()
    }

    /// Entries requested when solving for `platform`
    pub fn constraints_for<'a>(
        &'a self,
        platform: &'a Platform,
    ) -> impl Iterator<Item = &'a ConstraintEntry> + 'a {
        self.constraints.iter().filter(move |c| c.applies_to(platform))
    }

    /// Entries belonging to one category
    pub fn constraints_in(&self, category: &Category) -> impl Iterator<Item = &ConstraintEntry> {
        let category = category.clone();
        self.constraints.iter().filter(move |c| c.category == category)
    }

    /// Copy of this spec without `dev` entries
    pub fn without_dev(&self) -> Self {
        Self {
            constraints: self
                .constraints
                .iter()
                .filter(|c| !c.category.is_dev())
                .cloned()
                .collect(),
            channels: self.channels.clone(),
            platforms: self.platforms.clone(),
        }
    }

    /// Copy of this spec targeting a different platform set
    pub fn with_platforms(&self, platforms: impl IntoIterator<Item = Platform>) -> LockResult<Self> {
        Self::new(self.constraints.clone(), self.channels.clone(), platforms)
    }

    /// Stable fingerprint over constraints, channels, platforms and categories.
    ///
    /// Constraint and channel order are part of the input; platform order
    /// is not, since the platform set is unordered.
    pub fn fingerprint(&self) -> LockResult<Fingerprint> {
        canonical_hash(&CanonicalSpec {
            format: FINGERPRINT_FORMAT,
            constraints: &self.constraints,
            channels: &self.channels,
            platforms: &self.platforms,
        })
    }

    /// Combine several specs into one.
    ///
    /// Constraints are unioned keeping first occurrence, platforms are
    /// unioned, and channels come from the first spec that declares any.
    pub fn aggregate(specs: &[LockSpec]) -> LockResult<Self> {
        let mut constraints: Vec<ConstraintEntry> = Vec::new();
        for entry in specs.iter().flat_map(|s| s.constraints.iter()) {
            if !constraints.contains(entry) {
                constraints.push(entry.clone());
            }
        }
        let channels = specs
            .iter()
            .map(|s| &s.channels)
            .find(|c| !c.is_empty())
            .cloned()
            .unwrap_or_default();
        let platforms: BTreeSet<Platform> = specs
            .iter()
            .flat_map(|s| s.platforms.iter().cloned())
            .collect();
        Self::new(constraints, channels, platforms)
    }
}
