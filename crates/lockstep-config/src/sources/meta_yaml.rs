//! conda-build `meta.yaml` recipe parsing.
//!
//! Recipes are Jinja templates with line selectors (`- zlib  # [linux]`).
//! Only `{% set %}` assignments and `{{ name }}` substitutions are rendered;
//! unknown expressions render empty. The recipe is rendered once per target
//! platform, and an entry selected on only some platforms is restricted to
//! them. Selectors that are not platform tags, such as `py27`, never match.

use std::collections::{BTreeMap, BTreeSet};

use lockstep_core::error::LockError;
use lockstep_core::{Category, ConstraintEntry, LockSpec, Platform};
use serde::Deserialize;
use tracing::debug;

use super::select_platforms;
use crate::ConfigResult;

/// Selector names that describe a platform; anything else is never true
const PLATFORM_TAGS: [&str; 16] = [
    "linux", "osx", "win", "unix", "linux32", "linux64", "osx64", "win32", "win64", "x86",
    "x86_64", "aarch64", "arm64", "armv7l", "ppc64le", "s390x",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetaYaml {
    requirements: Option<Requirements>,
    test: Option<TestSection>,
    extra: Option<Extra>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Requirements {
    host: Option<Vec<Option<String>>>,
    run: Option<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestSection {
    requires: Option<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Extra {
    channels: Vec<String>,
    platforms: Option<Vec<String>>,
}

impl MetaYaml {
    fn load(content: &str, file: &str, platform: Option<&Platform>) -> ConfigResult<Self> {
        let rendered = render(content, platform);
        serde_yaml::from_str(&rendered).map_err(|e| LockError::YamlParse {
            file: file.to_string(),
            message: e.to_string(),
        })
    }

    /// `requirements.host` and `requirements.run` as `main`, then
    /// `test.requires` as `dev`
    fn requested(self, include_dev: bool) -> Vec<(String, Category)> {
        let mut requested = Vec::new();
        if let Some(requirements) = self.requirements {
            let main = requirements.host.into_iter().chain(requirements.run);
            requested.extend(main.flatten().flatten().map(|spec| (spec, Category::main())));
        }
        if include_dev {
            if let Some(test) = self.test {
                let dev = test.requires.into_iter().flatten().flatten();
                requested.extend(dev.map(|spec| (spec, Category::dev())));
            }
        }
        requested
            .into_iter()
            .map(|(spec, category)| (spec.trim().to_string(), category))
            .filter(|(spec, _)| !spec.is_empty())
            .collect()
    }
}

/// Parse a meta.yaml recipe. Channels and default platforms come from
/// the recipe's `extra` section.
pub fn parse_meta_yaml(
    content: &str,
    file: &str,
    platforms: &[Platform],
    include_dev: bool,
) -> ConfigResult<LockSpec> {
    let unselected = MetaYaml::load(content, file, None)?;
    let extra = unselected.extra.unwrap_or_default();
    let platforms = select_platforms(platforms, extra.platforms, file)?;
    let all: BTreeSet<Platform> = platforms.iter().cloned().collect();

    let mut requested: Vec<(String, Category, BTreeSet<Platform>)> = Vec::new();
    for platform in &all {
        let recipe = MetaYaml::load(content, file, Some(platform))?;
        for (spec, category) in recipe.requested(include_dev) {
            match requested
                .iter_mut()
                .find(|(s, c, _)| *s == spec && *c == category)
            {
                Some((_, _, on)) => {
                    on.insert(platform.clone());
                }
                None => requested.push((spec, category, BTreeSet::from([platform.clone()]))),
            }
        }
    }

    let constraints = requested
        .into_iter()
        .map(|(spec, category, on)| {
            let entry = ConstraintEntry::parse(&spec, category)?;
            if on == all {
                Ok(entry)
            } else {
                debug!("{}: '{}' selected only on {} platform(s)", file, spec, on.len());
                entry.only_on(on)
            }
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    LockSpec::new(constraints, extra.channels, platforms)
}

/// Render the template for one platform, or with every selected line
/// dropped when `platform` is `None`
fn render(content: &str, platform: Option<&Platform>) -> String {
    let tags = platform.map(selector_tags).unwrap_or_default();
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    let mut rendered = String::with_capacity(content.len());

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("{%") {
            if let Some((name, value)) = parse_set(trimmed) {
                vars.insert(name, value);
            }
            continue;
        }

        let line = match split_selector(line) {
            Some((body, selector)) => {
                if platform.is_none() || !eval_selector(selector, &tags) {
                    continue;
                }
                body
            }
            None => line,
        };

        rendered.push_str(&substitute(line, &vars));
        rendered.push('\n');
    }
    rendered
}

/// `{% set name = "value" %}`
fn parse_set(statement: &str) -> Option<(String, String)> {
    let body = statement
        .strip_prefix("{%")?
        .strip_suffix("%}")?
        .trim_matches('-')
        .trim();
    let (name, value) = body.strip_prefix("set ")?.split_once('=')?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((name.trim().to_string(), value.to_string()))
}

/// Replace `{{ expr }}` with a known variable, ignoring filters
fn substitute(line: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let expr = &rest[start + 2..start + len];
        let name = expr.split('|').next().unwrap_or_default().trim();
        if let Some(value) = vars.get(name) {
            out.push_str(value);
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

/// Split `  - zlib  # [linux]` into the line body and the selector
fn split_selector(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_end().strip_suffix(']')?;
    let open = body.rfind('[')?;
    let before = body[..open].trim_end().strip_suffix('#')?;
    if before.trim().is_empty() {
        return None;
    }
    Some((before.trim_end(), body[open + 1..].trim()))
}

/// Tags true on a platform: the OS, `unix` where it applies, and the
/// architecture (`linux64` for `linux-64`, `arm64` for `osx-arm64`)
fn selector_tags(platform: &Platform) -> Vec<String> {
    let os = platform.os();
    let arch = platform
        .as_str()
        .split_once('-')
        .map_or("", |(_, arch)| arch);

    let mut tags = vec![os.to_string()];
    if matches!(os, "linux" | "osx") {
        tags.push("unix".to_string());
    }
    match arch {
        "64" => {
            tags.push(format!("{}64", os));
            tags.push("x86_64".to_string());
        }
        "32" => {
            tags.push(format!("{}32", os));
            tags.push("x86".to_string());
        }
        other => tags.push(other.to_string()),
    }
    tags
}

/// Evaluate `a or b and not c` over platform tags
fn eval_selector(selector: &str, tags: &[String]) -> bool {
    selector.split(" or ").any(|conjunction| {
        conjunction.split(" and ").all(|term| {
            let term = term.trim();
            let (negated, tag) = match term.strip_prefix("not ") {
                Some(tag) => (true, tag.trim()),
                None => (false, term),
            };
            if !PLATFORM_TAGS.iter().any(|known| *known == tag) {
                return false;
            }
            tags.iter().any(|t| t == tag) != negated
        })
    })
}
