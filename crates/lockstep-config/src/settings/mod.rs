//! lockstep.toml engine configuration parsing and serialization

use lockstep_core::error::LockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ConfigResult;

/// Complete lockstep.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LockstepToml {
    /// External solver invocation
    #[serde(default)]
    pub solver: SolverSection,

    /// Orchestration settings
    #[serde(default)]
    pub resolve: ResolveSection,

    /// Lock output settings
    #[serde(default)]
    pub lock: LockSection,
}

/// Which solver executable family to drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Pick the first of micromamba, mamba, conda found on PATH
    #[default]
    Auto,
    Conda,
    Mamba,
    Micromamba,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Auto => "auto",
            SolverKind::Conda => "conda",
            SolverKind::Mamba => "mamba",
            SolverKind::Micromamba => "micromamba",
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SolverKind::Auto),
            "conda" => Ok(SolverKind::Conda),
            "mamba" => Ok(SolverKind::Mamba),
            "micromamba" => Ok(SolverKind::Micromamba),
            other => Err(LockError::ConfigValidation {
                field: "solver.kind".to_string(),
                reason: format!("unknown solver '{}', expected auto, conda, mamba or micromamba", other),
            }),
        }
    }
}

/// `[solver]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SolverSection {
    #[serde(default)]
    pub kind: SolverKind,

    /// Explicit solver executable; overrides discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Per-platform wall clock limit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per platform, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// `[resolve]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResolveSection {
    /// Ceiling on concurrently running solver processes
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Emit a lock with missing platforms flagged instead of failing
    #[serde(default)]
    pub allow_degraded: bool,

    /// Resolve `dev` category constraints too
    #[serde(default = "default_true")]
    pub include_dev: bool,
}

/// `[lock]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LockSection {
    /// Where the lock document is persisted
    #[serde(default = "default_lock_path")]
    pub path: String,

    /// Name pattern for rendered explicit files
    #[serde(default = "default_filename_format")]
    pub filename_format: String,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_lock_path() -> String {
    "lockstep.lock".to_string()
}

fn default_filename_format() -> String {
    "conda-{platform}-{dev-dependencies}.lock".to_string()
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            executable: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for ResolveSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            allow_degraded: false,
            include_dev: true,
        }
    }
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
            filename_format: default_filename_format(),
        }
    }
}

impl SolverSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parse TOML string to LockstepToml configuration
pub fn parse_lockstep_toml(content: &str, file: &str) -> ConfigResult<LockstepToml> {
    // First try with toml_edit for better error reporting
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| LockError::TomlParse {
            file: file.to_string(),
            message: format!("TOML syntax error: {}", e),
        })?;

    // Then parse with serde for type safety
    let config: LockstepToml = toml::from_str(content).map_err(|e| LockError::TomlParse {
        file: file.to_string(),
        message: e.to_string(),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize LockstepToml to TOML string
pub fn serialize_lockstep_toml(config: &LockstepToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| LockError::Serialization {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration ranges
pub fn validate_config(config: &LockstepToml) -> ConfigResult<()> {
    let invalid = |field: &str, reason: &str| {
        Err(LockError::ConfigValidation {
            field: field.to_string(),
            reason: reason.to_string(),
        })
    };

    let solver = &config.solver;
    if solver.timeout_secs == 0 {
        return invalid("solver.timeout-secs", "must be greater than zero");
    }
    if solver.max_attempts == 0 {
        return invalid("solver.max-attempts", "must be at least 1");
    }
    if !(solver.multiplier >= 1.0) {
        return invalid("solver.multiplier", "must be at least 1.0");
    }
    if solver.initial_backoff_ms > solver.max_backoff_ms {
        return invalid(
            "solver.initial-backoff-ms",
            "must not exceed solver.max-backoff-ms",
        );
    }
    if config.resolve.max_concurrency == 0 {
        return invalid("resolve.max-concurrency", "must be at least 1");
    }
    if config.lock.path.trim().is_empty() {
        return invalid("lock.path", "must not be empty");
    }
    if !config.lock.filename_format.contains("{platform}") {
        return invalid(
            "lock.filename-format",
            "must contain the {platform} placeholder",
        );
    }

    Ok(())
}

/// Load and parse lockstep.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<LockstepToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LockError::io(format!("Failed to read {}", path), e))?;

    parse_lockstep_toml(&content, path.as_str())
}
