//! pyproject.toml parsing for poetry, flit and PEP 621 projects.
//!
//! Python requirement names are normalized (lower case, `_` to `-`) so they
//! line up with conda package names. Only version constraints are carried
//! over; environment markers and extras have no conda equivalent and are
//! dropped.

use lockstep_core::error::LockError;
use lockstep_core::{Category, ConstraintEntry, LockSpec, Platform, VersionConstraint};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::select_platforms;
use crate::ConfigResult;

/// Channel used when the project does not declare any
const DEFAULT_CHANNEL: &str = "defaults";

/// Extras of flit and PEP 621 projects that count as development dependencies
const DEV_EXTRAS: [&str; 2] = ["dev", "test"];

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    tool: Tool,
    project: Option<Project>,
}

#[derive(Debug, Default, Deserialize)]
struct Tool {
    poetry: Option<Poetry>,
    flit: Option<Flit>,
    lockstep: Option<LockstepTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Poetry {
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    group: BTreeMap<String, PoetryGroup>,
}

#[derive(Debug, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct Flit {
    metadata: Option<FlitMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FlitMetadata {
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    requires_extra: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Project {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Vec<String>>,
}

/// `[tool.lockstep]`: channel and platform overrides for Python projects
#[derive(Debug, Default, Deserialize)]
struct LockstepTool {
    #[serde(default)]
    channels: Vec<String>,
    platforms: Option<Vec<String>>,
}

/// Parse a pyproject.toml into a spec, detecting the build backend
pub fn parse_pyproject_toml(
    content: &str,
    file: &str,
    platforms: &[Platform],
    include_dev: bool,
) -> ConfigResult<LockSpec> {
    let pyproject: PyProject = toml::from_str(content).map_err(|e| LockError::TomlParse {
        file: file.to_string(),
        message: e.to_string(),
    })?;

    let constraints = if let Some(poetry) = &pyproject.tool.poetry {
        debug!("{} is a poetry project", file);
        poetry_constraints(poetry)?
    } else if let Some(metadata) = pyproject.tool.flit.as_ref().and_then(|f| f.metadata.as_ref()) {
        debug!("{} is a flit project", file);
        pep508_constraints(&metadata.requires, &metadata.requires_extra)?
    } else if let Some(project) = &pyproject.project {
        debug!("{} is a PEP 621 project", file);
        pep508_constraints(&project.dependencies, &project.optional_dependencies)?
    } else {
        return Err(LockError::invalid_spec(format!(
            "{} declares no poetry, flit or [project] dependencies",
            file
        )));
    };

    let constraints = constraints
        .into_iter()
        .filter(|c| include_dev || c.category.is_main())
        .collect();

    let settings = pyproject.tool.lockstep.unwrap_or_default();
    let channels = if settings.channels.is_empty() {
        vec![DEFAULT_CHANNEL.to_string()]
    } else {
        settings.channels
    };
    let platforms = select_platforms(platforms, settings.platforms, file)?;

    LockSpec::new(constraints, channels, platforms)
}

fn poetry_constraints(poetry: &Poetry) -> ConfigResult<Vec<ConstraintEntry>> {
    let mut constraints = Vec::new();
    for (name, value) in &poetry.dependencies {
        push_poetry_entry(&mut constraints, name, value, Category::main())?;
    }
    for (name, value) in &poetry.dev_dependencies {
        push_poetry_entry(&mut constraints, name, value, Category::dev())?;
    }
    for group in poetry.group.values() {
        for (name, value) in &group.dependencies {
            push_poetry_entry(&mut constraints, name, value, Category::dev())?;
        }
    }
    Ok(constraints)
}

fn push_poetry_entry(
    constraints: &mut Vec<ConstraintEntry>,
    name: &str,
    value: &toml::Value,
    category: Category,
) -> ConfigResult<()> {
    let version = match value {
        toml::Value::String(version) => version.as_str(),
        toml::Value::Table(table) => {
            if table.get("optional").and_then(toml::Value::as_bool) == Some(true) {
                debug!("skipping optional dependency {}", name);
                return Ok(());
            }
            match table.get("version").and_then(toml::Value::as_str) {
                Some(version) => version,
                None => {
                    warn!("dependency {} has no version (git or path source), skipping", name);
                    return Ok(());
                }
            }
        }
        other => {
            return Err(LockError::invalid_spec(format!(
                "unsupported poetry dependency form for '{}': {}",
                name, other
            )))
        }
    };

    let mut entry = ConstraintEntry::new(normalize_name(name), category)?;
    if let Some(version) = poetry_version_to_conda_version(version)? {
        entry = entry.with_version(VersionConstraint::parse(&version)?);
    }
    constraints.push(entry);
    Ok(())
}

fn pep508_constraints(
    requires: &[String],
    extras: &BTreeMap<String, Vec<String>>,
) -> ConfigResult<Vec<ConstraintEntry>> {
    let mut constraints = requires
        .iter()
        .map(|r| parse_pep508(r, Category::main()))
        .collect::<ConfigResult<Vec<_>>>()?;
    for extra in DEV_EXTRAS {
        for requirement in extras.get(extra).into_iter().flatten() {
            constraints.push(parse_pep508(requirement, Category::dev())?);
        }
    }
    Ok(constraints)
}

/// Parse a PEP 508 requirement such as `requests[socks] (>=2.13.0); python_version<"3.8"`
fn parse_pep508(requirement: &str, category: Category) -> ConfigResult<ConstraintEntry> {
    let without_marker = requirement.split(';').next().unwrap_or_default().trim();
    let name_len = without_marker
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(without_marker.len());
    let (name, mut rest) = without_marker.split_at(name_len);
    let entry = ConstraintEntry::new(normalize_name(name), category)?;

    rest = rest.trim_start();
    if let Some(after) = rest.strip_prefix('[') {
        rest = after
            .split_once(']')
            .map(|(_, tail)| tail)
            .ok_or_else(|| {
                LockError::invalid_spec(format!("unterminated extras in '{}'", requirement))
            })?
            .trim();
    }
    let rest = rest
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .unwrap_or(rest)
        .trim();

    if rest.is_empty() {
        return Ok(entry);
    }
    let version = rest.replace("===", "==");
    Ok(entry.with_version(VersionConstraint::parse(&version)?))
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

/// Convert a poetry version requirement to conda syntax.
///
/// Returns `None` when the requirement places no constraint (`*`).
pub fn poetry_version_to_conda_version(version: &str) -> ConfigResult<Option<String>> {
    let compact: String = version.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || compact == "*" {
        return Ok(None);
    }

    let alternatives = compact
        .split("||")
        .map(|alternative| {
            let terms = alternative
                .split(',')
                .filter(|term| !term.is_empty())
                .map(convert_poetry_term)
                .collect::<ConfigResult<Vec<_>>>()?;
            Ok(terms.join(","))
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(Some(alternatives.join("|")))
}

fn convert_poetry_term(term: &str) -> ConfigResult<String> {
    if let Some(base) = term.strip_prefix('^') {
        let pieces = numeric_pieces(base, term)?;
        // Bump the left-most non-zero component
        let bump = pieces.iter().position(|p| *p != 0).unwrap_or(pieces.len() - 1);
        return Ok(format!(">={},<{}", base, upper_bound(&pieces, bump)));
    }
    if term.starts_with('~') && !term.starts_with("~=") {
        let base = &term[1..];
        let pieces = numeric_pieces(base, term)?;
        let bump = if pieces.len() > 1 { 1 } else { 0 };
        return Ok(format!(">={},<{}", base, upper_bound(&pieces, bump)));
    }
    Ok(term.replace("===", "=="))
}

fn numeric_pieces(base: &str, term: &str) -> ConfigResult<Vec<u64>> {
    base.split('.')
        .map(|piece| {
            piece.parse::<u64>().map_err(|_| {
                LockError::invalid_spec(format!("cannot expand poetry requirement '{}'", term))
            })
        })
        .collect()
}

fn upper_bound(pieces: &[u64], bump: usize) -> String {
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| match i.cmp(&bump) {
            std::cmp::Ordering::Less => piece.to_string(),
            std::cmp::Ordering::Equal => (piece + 1).to_string(),
            std::cmp::Ordering::Greater => "0".to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    const POETRY: &str = r#"
[tool.poetry]
name = "conda-lock-test-poetry"
version = "0.0.1"

[tool.poetry.dependencies]
requests = "^2.13.0"
toml = ">=0.10"
tomlkit = { version = "^0.7.0", optional = true }
My_Package = { git = "https://example.com/pkg.git" }

[tool.poetry.dev-dependencies]
pytest = "~5.1.0"
"#;

    const FLIT: &str = r#"
[tool.flit.metadata]
module = "conda_lock_test_flit"
requires = [
    "requests >=2.13.0",
    "toml>=0.10",
    'typing-extensions; python_version < "3.8"',
]

[tool.flit.metadata.requires-extra]
test = ["pytest >=5.1.0"]
doc = ["sphinx"]
"#;

    fn match_specs(spec: &LockSpec) -> Vec<String> {
        spec.constraints().iter().map(|c| c.to_match_spec()).collect()
    }

    #[test]
    fn test_parse_poetry() {
        for include_dev in [true, false] {
            let spec = parse_pyproject_toml(POETRY, "pyproject.toml", &[], include_dev).unwrap();
            let specs = match_specs(&spec);
            assert!(specs.contains(&"requests >=2.13.0,<3.0.0".to_string()));
            assert!(specs.contains(&"toml >=0.10".to_string()));
            assert_eq!(specs.contains(&"pytest >=5.1.0,<5.2.0".to_string()), include_dev);
            assert!(!specs.iter().any(|s| s.starts_with("tomlkit")));
            assert!(!specs.iter().any(|s| s.starts_with("my-package")));
            assert_eq!(spec.channels(), ["defaults"]);
        }
    }

    #[test]
    fn test_poetry_dev_category() {
        let spec = parse_pyproject_toml(POETRY, "pyproject.toml", &[], true).unwrap();
        let pytest = spec.constraints().iter().find(|c| c.name == "pytest").unwrap();
        assert!(pytest.category.is_dev());
    }

    #[test]
    fn test_poetry_group_dependencies_are_dev() {
        let content = r#"
[tool.poetry.dependencies]
python = "^3.9"

[tool.poetry.group.test.dependencies]
black = "*"
"#;
        let spec = parse_pyproject_toml(content, "pyproject.toml", &[], true).unwrap();
        assert_eq!(match_specs(&spec), vec!["python >=3.9,<4.0", "black"]);
        assert!(spec.constraints()[1].category.is_dev());
    }

    #[test]
    fn test_parse_flit() {
        for include_dev in [true, false] {
            let spec = parse_pyproject_toml(FLIT, "pyproject.toml", &[], include_dev).unwrap();
            let specs = match_specs(&spec);
            assert!(specs.contains(&"requests >=2.13.0".to_string()));
            assert!(specs.contains(&"toml >=0.10".to_string()));
            assert!(specs.contains(&"typing-extensions".to_string()));
            assert_eq!(specs.contains(&"pytest >=5.1.0".to_string()), include_dev);
            assert!(!specs.iter().any(|s| s.starts_with("sphinx")));
            assert_eq!(spec.channels(), ["defaults"]);
        }
    }

    #[test]
    fn test_parse_pep621_with_lockstep_table() {
        let content = r#"
[project]
name = "demo"
dependencies = ["numpy (>=1.21)", "scipy[all]"]

[project.optional-dependencies]
dev = ["pytest"]

[tool.lockstep]
channels = ["conda-forge"]
platforms = ["linux-64"]
"#;
        let spec = parse_pyproject_toml(content, "pyproject.toml", &[], true).unwrap();
        assert_eq!(match_specs(&spec), vec!["numpy >=1.21", "scipy", "pytest"]);
        assert_eq!(spec.channels(), ["conda-forge"]);
        assert_eq!(spec.platforms().len(), 1);
    }

    #[test]
    fn test_pyproject_without_dependencies_is_rejected() {
        let err = parse_pyproject_toml("[build-system]\nrequires = []\n", "pyproject.toml", &[], true)
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidSpec { .. }));
    }

    #[test]
    fn test_poetry_version_parsing_constraints() {
        let cases = [
            ("^2.13.0", Some(">=2.13.0,<3.0.0")),
            ("~5.1.0", Some(">=5.1.0,<5.2.0")),
            ("^2.7", Some(">=2.7,<3.0")),
            ("~3.6", Some(">=3.6,<3.7")),
            ("^0.10", Some(">=0.10,<0.11")),
            ("^0.0.3", Some(">=0.0.3,<0.0.4")),
            ("~2", Some(">=2,<3")),
            (">=1.0, <2.0", Some(">=1.0,<2.0")),
            ("~=1.4", Some("~=1.4")),
            ("==1.2.3", Some("==1.2.3")),
            ("^1.0 || ^2.0", Some(">=1.0,<2.0|>=2.0,<3.0")),
            ("*", None),
        ];
        for (input, expected) in cases {
            assert_eq!(
                poetry_version_to_conda_version(input).unwrap().as_deref(),
                expected,
                "converting {input}"
            );
        }
    }

    #[test]
    fn test_poetry_version_rejects_non_numeric_caret() {
        assert!(poetry_version_to_conda_version("^1.x").is_err());
    }
}
