//! Dependency sources a `LockSpec` is built from.
//!
//! Each source format has its own parser taking the file contents; this
//! module dispatches on the file name and aggregates multiple sources.

pub mod environment_yaml;
pub mod meta_yaml;
pub mod pyproject;

use camino::Utf8Path;
use lockstep_core::error::LockError;
use lockstep_core::{LockSpec, Platform};
use tracing::debug;

use crate::ConfigResult;

pub use environment_yaml::parse_environment_yaml;
pub use meta_yaml::parse_meta_yaml;
pub use pyproject::{parse_pyproject_toml, poetry_version_to_conda_version};

/// Platforms locked when neither the caller nor the source names any
pub const DEFAULT_PLATFORMS: [&str; 3] = ["linux-64", "osx-64", "win-64"];

/// Pick the platform set for a source: caller request, then file, then defaults
pub(crate) fn select_platforms(
    requested: &[Platform],
    declared: Option<Vec<String>>,
    file: &str,
) -> ConfigResult<Vec<Platform>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    match declared {
        Some(declared) if !declared.is_empty() => declared
            .into_iter()
            .map(|p| {
                Platform::new(p).map_err(|e| LockError::invalid_spec(format!("{}: {}", file, e)))
            })
            .collect(),
        _ => DEFAULT_PLATFORMS.iter().map(|p| Platform::new(*p)).collect(),
    }
}

/// Read and parse one source file, dispatching on its name
pub async fn parse_source_file(
    path: &Utf8Path,
    platforms: &[Platform],
    include_dev: bool,
) -> ConfigResult<LockSpec> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LockError::io(format!("Failed to read {}", path), e))?;

    let file_name = path.file_name().unwrap_or(path.as_str());
    debug!("parsing spec source {}", path);

    match path.extension() {
        Some("yml") | Some("yaml") if matches!(file_name, "meta.yaml" | "meta.yml") => {
            parse_meta_yaml(&content, path.as_str(), platforms, include_dev)
        }
        Some("yml") | Some("yaml") => parse_environment_yaml(&content, path.as_str(), platforms),
        Some("toml") if file_name == "pyproject.toml" => {
            parse_pyproject_toml(&content, path.as_str(), platforms, include_dev)
        }
        _ => Err(LockError::invalid_spec(format!(
            "unsupported spec source '{}', expected environment.yml, meta.yaml or pyproject.toml",
            path
        ))),
    }
}

/// Parse several source files and combine them into one spec
pub async fn parse_source_files(
    paths: &[&Utf8Path],
    platforms: &[Platform],
    include_dev: bool,
) -> ConfigResult<LockSpec> {
    let mut specs = Vec::with_capacity(paths.len());
    for path in paths {
        specs.push(parse_source_file(path, platforms, include_dev).await?);
    }
    LockSpec::aggregate(&specs)
}
