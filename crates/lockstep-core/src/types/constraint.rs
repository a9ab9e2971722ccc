//! Version constraint grammar and constraint entries.
//!
//! Constraints follow the conda match-spec shape: `name [version [build]]`,
//! where a version expression is `|`-separated alternatives of
//! `,`-separated comparator terms (`>=1.0,<2.0|3.*`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{Category, Platform};
use crate::error::{LockError, LockResult};

/// Comparison operator for a single version term
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Op {
    Exact,      // ==1.0
    Fuzzy,      // =1.0 (prefix match)
    NotEq,      // !=1.0
    Greater,    // >1.0
    GreaterEq,  // >=1.0
    Less,       // <1.0
    LessEq,     // <=1.0
    Compatible, // ~=1.0
}

impl Op {
    /// Operators ordered so that longer tokens are tried first
    const TOKENS: [(&'static str, Op); 8] = [
        ("==", Op::Exact),
        ("!=", Op::NotEq),
        (">=", Op::GreaterEq),
        ("<=", Op::LessEq),
        ("~=", Op::Compatible),
        (">", Op::Greater),
        ("<", Op::Less),
        ("=", Op::Fuzzy),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Exact => "==",
            Op::Fuzzy => "=",
            Op::NotEq => "!=",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Compatible => "~=",
        }
    }

    fn allows_wildcard(&self) -> bool {
        matches!(self, Op::Exact | Op::Fuzzy | Op::NotEq)
    }
}

/// One comparator term, e.g. `>=1.0` or a bare `1.2.*`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Comparator {
    pub op: Option<Op>,
    pub version: String,
}

impl Comparator {
    fn parse(term: &str) -> LockResult<Self> {
        let (op, version) = Op::TOKENS
            .iter()
            .find_map(|(token, op)| term.strip_prefix(token).map(|rest| (Some(*op), rest)))
            .unwrap_or((None, term));

        let comparator = Self {
            op,
            version: version.to_string(),
        };
        comparator.validate()?;
        Ok(comparator)
    }

    /// Check the version text against the operator it is used with
    pub fn validate(&self) -> LockResult<()> {
        let version = self.version.as_str();
        if version.is_empty() {
            return Err(LockError::invalid_spec(format!(
                "operator in '{}' is missing a version",
                self
            )));
        }
        if let Some(bad) = version.chars().find(|c| !is_version_char(*c)) {
            return Err(LockError::invalid_spec(format!(
                "illegal character '{}' in version '{}'",
                bad, self
            )));
        }
        if version.starts_with('.') || version.ends_with('.') || version.contains("..") {
            return Err(LockError::invalid_spec(format!(
                "malformed version '{}'",
                version
            )));
        }
        if let Some(op) = self.op {
            if version.contains('*') && !op.allows_wildcard() {
                return Err(LockError::invalid_spec(format!(
                    "wildcard not allowed with '{}' in '{}'",
                    op.as_str(),
                    self
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Some(op) => write!(f, "{}{}", op.as_str(), self.version),
            None => f.write_str(&self.version),
        }
    }
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '*' | '+' | '!')
}

/// Version expression: any alternative must hold, every term of it must hold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub alternatives: Vec<Vec<Comparator>>,
}

impl VersionConstraint {
    /// Parse a version expression; whitespace is not significant
    pub fn parse(input: &str) -> LockResult<Self> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(LockError::invalid_spec("empty version constraint"));
        }

        let alternatives = compact
            .split('|')
            .map(|group| {
                if group.is_empty() {
                    return Err(LockError::invalid_spec(format!(
                        "empty alternative in '{}'",
                        input
                    )));
                }
                group
                    .split(',')
                    .map(|term| {
                        if term.is_empty() {
                            Err(LockError::invalid_spec(format!(
                                "empty term in '{}'",
                                input
                            )))
                        } else {
                            Comparator::parse(term)
                        }
                    })
                    .collect::<LockResult<Vec<_>>>()
            })
            .collect::<LockResult<Vec<_>>>()?;

        Ok(Self { alternatives })
    }

    /// Check every term; values built through serde skip `parse`
    pub fn validate(&self) -> LockResult<()> {
        if self.alternatives.is_empty() {
            return Err(LockError::invalid_spec("empty version constraint"));
        }
        for terms in &self.alternatives {
            if terms.is_empty() {
                return Err(LockError::invalid_spec(format!(
                    "empty alternative in '{}'",
                    self
                )));
            }
            terms.iter().try_for_each(Comparator::validate)?;
        }
        Ok(())
    }

    /// True when the expression is a bare `*`
    pub fn is_any(&self) -> bool {
        matches!(self.alternatives.as_slice(), [terms] if matches!(terms.as_slice(), [c] if c.op.is_none() && c.version == "*"))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .alternatives
            .iter()
            .map(|terms| {
                terms
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("|");
        f.write_str(&rendered)
    }
}

impl FromStr for VersionConstraint {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A single requested package with its constraint and category
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Exact version pin that takes precedence over `version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default)]
    pub category: Category,
    /// Platforms the entry applies to; unset means every platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<BTreeSet<Platform>>,
}

impl ConstraintEntry {
    /// Create an unconstrained entry in the given category
    pub fn new(name: impl Into<String>, category: Category) -> LockResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            version: None,
            build: None,
            pin: None,
            category,
            platforms: None,
        })
    }

    /// Attach a version constraint
    pub fn with_version(mut self, version: VersionConstraint) -> Self {
        self.version = Some(version);
        self
    }

    /// Pin to an exact version
    pub fn pinned(mut self, version: impl Into<String>) -> LockResult<Self> {
        let version = version.into();
        validate_pin(&self.name, &version)?;
        self.pin = Some(version);
        Ok(self)
    }

    /// Restrict the entry to a subset of the locked platforms
    pub fn only_on(mut self, platforms: impl IntoIterator<Item = Platform>) -> LockResult<Self> {
        let platforms: BTreeSet<Platform> = platforms.into_iter().collect();
        if platforms.is_empty() {
            return Err(LockError::invalid_spec(format!(
                "'{}' is restricted to an empty platform set",
                self.name
            )));
        }
        self.platforms = Some(platforms);
        Ok(self)
    }

    /// Whether the entry is requested when solving for `platform`
    pub fn applies_to(&self, platform: &Platform) -> bool {
        self.platforms
            .as_ref()
            .map_or(true, |platforms| platforms.contains(platform))
    }

    /// Re-check every field, for entries that did not come through `parse`
    pub fn validate(&self) -> LockResult<()> {
        validate_name(&self.name)?;
        if let Some(version) = &self.version {
            version.validate()?;
        }
        if let Some(build) = &self.build {
            validate_build(build, &self.name)?;
        }
        if let Some(pin) = &self.pin {
            validate_pin(&self.name, pin)?;
        }
        if self.platforms.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(LockError::invalid_spec(format!(
                "'{}' is restricted to an empty platform set",
                self.name
            )));
        }
        Ok(())
    }

    /// Parse a match-spec string such as `tool>=1.0,<2.0`, `python =3.7`,
    /// `numpy 1.21.* py39*` or `requests[version='>=2.13.0']`
    pub fn parse(input: &str, category: Category) -> LockResult<Self> {
        let input = input.trim();
        let name_len = input
            .find(|c: char| !is_name_char(c))
            .unwrap_or(input.len());
        let (name, rest) = input.split_at(name_len);
        let mut entry = Self::new(name.to_ascii_lowercase(), category)?;

        let rest = rest.trim();
        if rest.is_empty() {
            return Ok(entry);
        }

        if let Some(body) = rest.strip_prefix('[') {
            let body = body.strip_suffix(']').ok_or_else(|| {
                LockError::invalid_spec(format!("unterminated '[' in '{}'", input))
            })?;
            for (key, value) in parse_bracket_pairs(body, input)? {
                match key.as_str() {
                    "version" => entry.version = Some(VersionConstraint::parse(&value)?),
                    "build" => entry.build = Some(validate_build(&value, input)?),
                    other => {
                        return Err(LockError::invalid_spec(format!(
                            "unknown key '{}' in '{}'",
                            other, input
                        )))
                    }
                }
            }
            return Ok(entry);
        }

        let (version, build) = split_version_and_build(rest, input)?;
        entry.version = Some(VersionConstraint::parse(&version)?);
        if let Some(build) = build {
            entry.build = Some(validate_build(&build, input)?);
        }
        Ok(entry)
    }

    /// Render the entry as a solver match spec (`name version build`)
    pub fn to_match_spec(&self) -> String {
        let version = match (&self.pin, &self.version) {
            (Some(pin), _) => Some(format!("=={}", pin)),
            (None, Some(version)) => Some(version.to_string()),
            (None, None) => None,
        };
        match (version, &self.build) {
            (Some(version), Some(build)) => format!("{} {} {}", self.name, version, build),
            (None, Some(build)) => format!("{} * {}", self.name, build),
            (Some(version), None) => format!("{} {}", self.name, version),
            (None, None) => self.name.clone(),
        }
    }
}

impl fmt::Display for ConstraintEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_match_spec())
    }
}

/// Check if this is a valid package name
pub fn is_valid_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().all(is_name_char)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn validate_name(name: &str) -> LockResult<()> {
    if name.is_empty() {
        return Err(LockError::invalid_spec("package name is empty"));
    }
    if !is_valid_name(name) {
        return Err(LockError::invalid_spec(format!(
            "invalid package name '{}'",
            name
        )));
    }
    Ok(())
}

fn validate_pin(name: &str, version: &str) -> LockResult<()> {
    let comparator = Comparator::parse(version)?;
    if comparator.op.is_some() || version.contains('*') {
        return Err(LockError::invalid_spec(format!(
            "pin for '{}' must be an exact version, got '{}'",
            name, version
        )));
    }
    Ok(())
}

fn validate_build(build: &str, input: &str) -> LockResult<String> {
    let valid = !build.is_empty()
        && build
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '.' | '+'));
    if valid {
        Ok(build.to_string())
    } else {
        Err(LockError::invalid_spec(format!(
            "malformed build string '{}' in '{}'",
            build, input
        )))
    }
}

/// Split `>= 1.0, <2.0 py39*` into the version expression and build token.
/// A token continues the expression when the previous token ends in an
/// operator or separator, or the token itself starts with a separator.
fn split_version_and_build(rest: &str, input: &str) -> LockResult<(String, Option<String>)> {
    let mut version = String::new();
    let mut remainder = Vec::new();

    for token in rest.split_whitespace() {
        let continues = remainder.is_empty()
            && (version.is_empty()
                || version.ends_with(|c: char| matches!(c, ',' | '|' | '=' | '<' | '>' | '!' | '~'))
                || token.starts_with(|c: char| matches!(c, ',' | '|')));
        if continues {
            version.push_str(token);
        } else {
            remainder.push(token);
        }
    }

    match remainder.as_slice() {
        [] => Ok((version, None)),
        [build] => Ok((version, Some((*build).to_string()))),
        _ => Err(LockError::invalid_spec(format!(
            "too many components in '{}'",
            input
        ))),
    }
}

/// Parse `version='>=1,<2', build="py*"` pairs
fn parse_bracket_pairs(body: &str, input: &str) -> LockResult<Vec<(String, String)>> {
    let malformed = || LockError::invalid_spec(format!("malformed bracket section in '{}'", input));
    let mut pairs = Vec::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=').ok_or_else(malformed)?;
        let after_key = after_key.trim_start();
        let quote = after_key.chars().next().filter(|c| *c == '\'' || *c == '"');
        let (value, after_value) = match quote {
            Some(quote) => {
                let inner = &after_key[1..];
                let end = inner.find(quote).ok_or_else(malformed)?;
                (&inner[..end], &inner[end + 1..])
            }
            None => match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            },
        };
        pairs.push((key.trim().to_string(), value.trim().to_string()));

        let after_value = after_value.trim_start();
        rest = match after_value.strip_prefix(',') {
            Some(next) => next.trim_start(),
            None if after_value.is_empty() => after_value,
            None => return Err(malformed()),
        };
    }

    Ok(pairs)
}
