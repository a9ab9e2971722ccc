//! The conda-family solver adapter.
//!
//! conda, mamba and micromamba share one invocation shape: a JSON dry run
//! of `create` into a throwaway prefix, with `CONDA_SUBDIR` selecting the
//! target platform and an empty package cache so every package is reported
//! with its download URL and digests.

pub mod output;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use lockstep_config::{SolverKind, SolverSection};
use lockstep_core::error::LockError;
use lockstep_core::{LockSpec, Platform, PlatformResolution, SolverMetadata};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::adapter::{ensure_platform, SolverAdapter};
use crate::discover::discover_solver;
use crate::normalize::{assign_categories, canonicalize};
use crate::process::{run_solver, SolverCommand};
use crate::SolverResult;

pub use output::{channel_name, parse_dry_run};

/// Adapter driving a conda, mamba or micromamba executable
#[derive(Debug)]
pub struct CondaSolver {
    executable: PathBuf,
    kind: SolverKind,
    timeout: Duration,
    version: OnceCell<String>,
}

impl CondaSolver {
    /// Create an adapter for a known executable; `Auto` is treated as conda
    pub fn new(executable: impl Into<PathBuf>, kind: SolverKind, timeout: Duration) -> Self {
        let kind = match kind {
            SolverKind::Auto => SolverKind::Conda,
            kind => kind,
        };
        Self {
            executable: executable.into(),
            kind,
            timeout,
            version: OnceCell::new(),
        }
    }

    /// Discover the executable described by a `[solver]` section
    pub fn from_section(section: &SolverSection) -> SolverResult<Self> {
        let (executable, kind) = discover_solver(section)?;
        Ok(Self::new(executable, kind, section.timeout()))
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    /// Build the dry-run invocation for one platform
    pub fn dry_run_command(
        &self,
        spec: &LockSpec,
        platform: &Platform,
        prefix: &std::path::Path,
        pkgs_dir: &std::path::Path,
    ) -> SolverCommand {
        let mut command = SolverCommand::new(&self.executable, self.timeout)
            .args(["create", "--prefix"])
            .arg(prefix)
            .args(["--dry-run", "--json"]);

        if !spec.channels().is_empty() {
            command = command.arg("--override-channels");
            for channel in spec.channels() {
                command = command.arg("-c").arg(channel);
            }
        }
        if self.kind == SolverKind::Micromamba {
            command = command.arg("--yes");
        }

        command
            .args(spec.constraints_for(platform).map(|c| c.to_match_spec()))
            .env("CONDA_SUBDIR", platform.as_str())
            .env("CONDA_PKGS_DIRS", pkgs_dir)
            .env("CONDA_UNSATISFIABLE_HINTS", "False")
    }

    async fn cached_version(&self) -> SolverResult<String> {
        self.version
            .get_or_try_init(|| async {
                let command = SolverCommand::new(&self.executable, self.timeout).arg("--version");
                let output = run_solver(&command, self.kind.as_str(), "-").await?;
                if !output.success() {
                    return Err(LockError::SolverProcess {
                        solver: self.kind.to_string(),
                        platform: "-".to_string(),
                        message: format!("--version failed: {}", output.stderr_tail()),
                        exit_code: output.exit_code,
                    });
                }
                parse_version(&output.stdout).ok_or_else(|| LockError::SolverOutputParse {
                    solver: self.kind.to_string(),
                    platform: "-".to_string(),
                    message: format!("unrecognised --version output '{}'", output.stdout.trim()),
                })
            })
            .await
            .cloned()
    }

    async fn resolve_platform(
        &self,
        spec: &LockSpec,
        platform: &Platform,
    ) -> SolverResult<PlatformResolution> {
        ensure_platform(spec, platform)?;
        let version = self.cached_version().await?;

        let scratch = tempfile::Builder::new()
            .prefix("lockstep-")
            .tempdir()
            .map_err(|e| LockError::io("Failed to create solver scratch directory", e))?;
        let pkgs_dir = scratch.path().join("pkgs");
        tokio::fs::create_dir(&pkgs_dir)
            .await
            .map_err(|e| LockError::io(format!("Failed to create {}", pkgs_dir.display()), e))?;
        let prefix = scratch.path().join("prefix");

        let command = self.dry_run_command(spec, platform, &prefix, &pkgs_dir);
        let output = run_solver(&command, self.name(), platform.as_str()).await?;

        let mut packages = parse_dry_run(&output, self.name(), platform)?;
        assign_categories(&mut packages, spec);
        canonicalize(&mut packages);
        info!(
            "{} resolved {} packages for {} in {}ms",
            self.name(),
            packages.len(),
            platform,
            output.duration_ms()
        );

        Ok(PlatformResolution {
            platform: platform.clone(),
            packages,
            solver: SolverMetadata {
                name: self.name().to_string(),
                version,
                duration_ms: output.duration_ms(),
                exit_code: output.exit_code,
            },
        })
    }
}

impl SolverAdapter for CondaSolver {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn version(&self) -> impl Future<Output = SolverResult<String>> + Send {
        self.cached_version()
    }

    fn resolve(
        &self,
        spec: &LockSpec,
        platform: &Platform,
    ) -> impl Future<Output = SolverResult<PlatformResolution>> + Send {
        debug!(
            "resolving {} constraints for {}",
            spec.constraints_for(platform).count(),
            platform
        );
        self.resolve_platform(spec, platform)
    }
}

/// Extract a version from `--version` output.
///
/// conda prints `conda 23.1.0`, mamba prints `mamba 1.4.2` followed by the
/// conda line, micromamba prints the bare version.
fn parse_version(stdout: &str) -> Option<String> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let version = first.split_whitespace().last()?;
    version
        .chars()
        .next()
        .filter(char::is_ascii_digit)
        .map(|_| version.to_string())
}
