//! Dependency category tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dependency group a constraint belongs to (`main`, `dev`, or a custom tag)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub const MAIN: &'static str = "main";
    pub const DEV: &'static str = "dev";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Default runtime dependency group
    pub fn main() -> Self {
        Self::new(Self::MAIN)
    }

    /// Development-only dependency group
    pub fn dev() -> Self {
        Self::new(Self::DEV)
    }

    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    pub fn is_dev(&self) -> bool {
        self.0 == Self::DEV
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::main()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
