//! Configuration layering, fallback logic, and environment overrides

use camino::Utf8PathBuf;
use lockstep_core::error::LockError;
use std::collections::HashMap;
use tracing::debug;

use crate::settings::{validate_config, LockstepToml};
use crate::ConfigResult;

/// Project configuration file name
pub const CONFIG_FILE: &str = "lockstep.toml";

/// Prefix of recognised environment overrides
const ENV_PREFIX: &str = "LOCKSTEP_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Project lockstep.toml file
    Project(Utf8PathBuf),
    /// No file found, built-in defaults
    Defaults,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Load project configuration, falling back to defaults when no file exists
    pub async fn load_project_table(&self) -> ConfigResult<(Option<toml::Table>, ConfigSource)> {
        let path = self.resolve_config_path(CONFIG_FILE);
        if !path.exists() {
            debug!("no {} found above {}, using defaults", CONFIG_FILE, self.cwd);
            return Ok((None, ConfigSource::Defaults));
        }
        let table = read_table(&path).await?;
        Ok((Some(table), ConfigSource::Project(path)))
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Utf8PathBuf {
        let mut current = self.cwd.as_path();

        loop {
            let config_path = current.join(filename);
            if config_path.exists() {
                return config_path;
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        // Return path in current directory even if it doesn't exist
        self.cwd.join(filename)
    }

    /// Load the user-wide configuration table from ~/.lockstep/config.toml
    pub async fn load_global_table(&self) -> ConfigResult<Option<toml::Table>> {
        let Some(home_dir) = dirs::home_dir() else {
            debug!("home directory unknown, skipping global config");
            return Ok(None);
        };

        let global_config_path = Utf8PathBuf::try_from(home_dir)
            .map_err(|e| LockError::ConfigValidation {
                field: "home_dir".to_string(),
                reason: format!("Invalid home directory path: {}", e),
            })?
            .join(".lockstep")
            .join("config.toml");

        if global_config_path.exists() {
            Ok(Some(read_table(&global_config_path).await?))
        } else {
            Ok(None)
        }
    }

    /// Load the fully layered configuration: defaults, global, project, environment
    pub async fn load(&self) -> ConfigResult<(LockstepToml, ConfigSource)> {
        let global = self.load_global_table().await?;
        let (project, source) = self.load_project_table().await?;
        let config = ConfigLayering::merge_configs(
            global,
            project,
            ConfigLayering::collect_env_overrides(),
        )?;
        Ok((config, source))
    }
}

async fn read_table(path: &camino::Utf8Path) -> ConfigResult<toml::Table> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LockError::io(format!("Failed to read {}", path), e))?;
    content
        .parse::<toml::Table>()
        .map_err(|e| LockError::TomlParse {
            file: path.to_string(),
            message: e.to_string(),
        })
}

impl ConfigLayering {
    /// Merge configuration layers; later layers win key by key
    pub fn merge_configs(
        global: Option<toml::Table>,
        project: Option<toml::Table>,
        env_overrides: HashMap<String, String>,
    ) -> ConfigResult<LockstepToml> {
        let mut merged = global.unwrap_or_default();
        if let Some(project) = project {
            deep_merge(&mut merged, project);
        }

        let mut config: LockstepToml =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| LockError::TomlParse {
                    file: crate::merge::CONFIG_FILE.to_string(),
                    message: e.to_string(),
                })?;

        Self::apply_env_overrides(&mut config, &env_overrides)?;
        validate_config(&config)?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        config: &mut LockstepToml,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "LOCKSTEP_SOLVER" => {
                    config.solver.kind = value.parse()?;
                }
                "LOCKSTEP_SOLVER_EXE" => {
                    config.solver.executable = Some(value.into());
                }
                "LOCKSTEP_SOLVER_TIMEOUT" => {
                    config.solver.timeout_secs = parse_env(key, value)?;
                }
                "LOCKSTEP_MAX_ATTEMPTS" => {
                    config.solver.max_attempts = parse_env(key, value)?;
                }
                "LOCKSTEP_MAX_CONCURRENCY" => {
                    config.resolve.max_concurrency = parse_env(key, value)?;
                }
                "LOCKSTEP_ALLOW_DEGRADED" => {
                    config.resolve.allow_degraded = parse_env(key, value)?;
                }
                "LOCKSTEP_INCLUDE_DEV" => {
                    config.resolve.include_dev = parse_env(key, value)?;
                }
                _ => {
                    // Unknown environment variable, ignore
                }
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| LockError::ConfigValidation {
        field: key.to_string(),
        reason: format!("cannot parse '{}': {}", value, e),
    })
}

/// Recursively merge `overlay` into `base`; overlay scalars replace base values
fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
