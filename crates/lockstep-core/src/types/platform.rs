//! Target platform identifiers.
//!
//! A platform is an OS/architecture subdir such as `linux-64` or
//! `osx-arm64`. Platforms are totally ordered so they can key sorted maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LockError, LockResult};

/// OS/architecture target for which packages are independently resolved
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform(String);

impl Platform {
    /// Subdir shared by every platform
    pub const NOARCH: &'static str = "noarch";

    /// Create a validated platform identifier
    pub fn new(name: impl Into<String>) -> LockResult<Self> {
        let name = name.into();
        if !Self::is_valid_name(&name) {
            return Err(LockError::invalid_spec(format!(
                "'{}' is not a valid platform (expected e.g. linux-64, osx-arm64, win-64)",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Check whether a string is a well-formed `os-arch` subdir
    pub fn is_valid_name(name: &str) -> bool {
        if name == Self::NOARCH {
            return true;
        }
        let Some((os, arch)) = name.split_once('-') else {
            return false;
        };
        let part_ok = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };
        part_ok(os) && part_ok(arch)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operating system half of the subdir (`linux`, `osx`, `win`)
    pub fn os(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(os, _)| os)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Platform {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for Platform {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.0
    }
}
