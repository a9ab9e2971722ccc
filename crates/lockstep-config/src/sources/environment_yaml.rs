//! conda `environment.yml` parsing

use lockstep_core::error::LockError;
use lockstep_core::{Category, ConstraintEntry, LockSpec, Platform};
use serde::Deserialize;

use super::select_platforms;
use crate::ConfigResult;

#[derive(Debug, Deserialize)]
struct EnvironmentYaml {
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    platforms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Dependency {
    Spec(String),
    /// Nested installer sections such as `pip:`; not conda packages
    Nested(serde_yaml::Mapping),
}

/// Parse an environment.yml document into a spec with every entry in `main`
pub fn parse_environment_yaml(
    content: &str,
    file: &str,
    platforms: &[Platform],
) -> ConfigResult<LockSpec> {
    let env: EnvironmentYaml = serde_yaml::from_str(content).map_err(|e| LockError::YamlParse {
        file: file.to_string(),
        message: e.to_string(),
    })?;

    let constraints = env
        .dependencies
        .iter()
        .filter_map(|dep| match dep {
            Dependency::Spec(spec) => Some(spec),
            Dependency::Nested(_) => None,
        })
        .map(|spec| ConstraintEntry::parse(spec, Category::main()))
        .collect::<ConfigResult<Vec<_>>>()?;

    let platforms = select_platforms(platforms, env.platforms, file)?;
    LockSpec::new(constraints, env.channels, platforms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GDAL: &str = r#"
name: gdal
channels:
  - conda-forge
  - defaults
dependencies:
  - python >=3.7,<3.8
  - gdal
  - pip
  - pip:
      - toolz
"#;

    #[test]
    fn test_parse_environment_file() {
        let spec = parse_environment_yaml(GDAL, "environment.yml", &[]).unwrap();
        let specs: Vec<String> = spec.constraints().iter().map(|c| c.to_match_spec()).collect();
        assert_eq!(specs, vec!["python >=3.7,<3.8", "gdal", "pip"]);
        assert_eq!(spec.channels(), ["conda-forge", "defaults"]);
        assert!(spec.constraints().iter().all(|c| c.category.is_main()));
    }

    #[test]
    fn test_declared_platforms_are_used() {
        let content = "dependencies: [zlib]\nplatforms: [linux-aarch64, osx-arm64]\n";
        let spec = parse_environment_yaml(content, "environment.yml", &[]).unwrap();
        let platforms: Vec<&str> = spec.platforms().iter().map(|p| p.as_str()).collect();
        assert_eq!(platforms, vec!["linux-aarch64", "osx-arm64"]);
    }

    #[test]
    fn test_malformed_yaml_is_reported() {
        let err = parse_environment_yaml("dependencies: [zlib", "environment.yml", &[]).unwrap_err();
        assert!(matches!(err, LockError::YamlParse { .. }));
    }

    #[test]
    fn test_malformed_constraint_is_rejected() {
        let err = parse_environment_yaml("dependencies: ['tool>=']\n", "environment.yml", &[])
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidSpec { .. }));
    }
}
