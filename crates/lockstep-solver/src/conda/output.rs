//! Parsing of `create --dry-run --json` output from conda-family solvers.
//!
//! `actions.LINK` is the resolved set. With an empty package cache every
//! package is also listed under `actions.FETCH`, which carries the URL,
//! digests and dependency list. micromamba puts those fields on the LINK
//! entries directly, so both places are consulted.

use std::collections::HashMap;

use lockstep_core::error::LockError;
use lockstep_core::types::HashAlgorithm;
use lockstep_core::{ArtifactHash, Category, Platform, ResolvedPackage};
use serde::Deserialize;

use crate::normalize::dependency_name;
use crate::process::ProcessOutput;
use crate::SolverResult;

/// Exception names that mean "no solution exists"
const UNSATISFIABLE_EXCEPTIONS: [&str; 5] = [
    "UnsatisfiableError",
    "PackagesNotFoundError",
    "ResolvePackageNotFound",
    "LibMambaUnsatisfiableError",
    "SpecsConfigurationConflictError",
];

#[derive(Debug, Deserialize)]
struct DryRunOutput {
    actions: Option<Actions>,
    exception_name: Option<String>,
    message: Option<String>,
    error: Option<String>,
    success: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct Actions {
    #[serde(rename = "LINK", default)]
    link: Vec<PackageRecord>,
    #[serde(rename = "FETCH", default)]
    fetch: Vec<PackageRecord>,
}

/// The union of fields LINK and FETCH entries may carry
#[derive(Debug, Clone, Deserialize)]
struct PackageRecord {
    name: String,
    version: String,
    build: Option<String>,
    build_string: Option<String>,
    channel: Option<String>,
    base_url: Option<String>,
    subdir: Option<String>,
    /// The subdir on conda LINK entries, the bare OS on full package records
    platform: Option<String>,
    url: Option<String>,
    md5: Option<String>,
    sha256: Option<String>,
    #[serde(default)]
    depends: Vec<String>,
}

impl PackageRecord {
    fn build(&self) -> Option<&String> {
        self.build_string.as_ref().or(self.build.as_ref())
    }

    fn subdir(&self) -> Option<&String> {
        self.subdir.as_ref().or_else(|| {
            self.platform
                .as_ref()
                .filter(|p| p.as_str() == Platform::NOARCH || p.contains('-'))
        })
    }

    fn key(&self) -> (&str, &str, &str) {
        (
            &self.name,
            &self.version,
            self.build().map(String::as_str).unwrap_or_default(),
        )
    }
}

/// Turn a finished dry-run process into resolved packages.
///
/// Packages come back in `main`; category assignment happens later.
pub fn parse_dry_run(
    output: &ProcessOutput,
    solver: &str,
    platform: &Platform,
) -> SolverResult<Vec<ResolvedPackage>> {
    let parse_error = |message: String| LockError::SolverOutputParse {
        solver: solver.to_string(),
        platform: platform.to_string(),
        message,
    };

    let parsed: DryRunOutput = match serde_json::from_str(output.stdout.trim()) {
        Ok(parsed) => parsed,
        Err(e) if output.success() => {
            return Err(parse_error(format!("invalid JSON on stdout: {}", e)));
        }
        Err(_) => {
            return Err(LockError::SolverProcess {
                solver: solver.to_string(),
                platform: platform.to_string(),
                message: non_empty(output.stderr_tail(), "exited without output"),
                exit_code: output.exit_code,
            });
        }
    };

    let failure_message = || {
        parsed
            .message
            .clone()
            .or_else(|| parsed.error.clone())
            .unwrap_or_else(|| non_empty(output.stderr_tail(), "solver reported failure"))
    };

    if let Some(exception) = &parsed.exception_name {
        if UNSATISFIABLE_EXCEPTIONS.contains(&exception.as_str()) {
            return Err(LockError::Unsatisfiable {
                platform: platform.to_string(),
                message: failure_message(),
            });
        }
        return Err(LockError::SolverProcess {
            solver: solver.to_string(),
            platform: platform.to_string(),
            message: format!("{}: {}", exception, failure_message()),
            exit_code: output.exit_code,
        });
    }
    if !output.success() || parsed.success == Some(false) {
        return Err(LockError::SolverProcess {
            solver: solver.to_string(),
            platform: platform.to_string(),
            message: failure_message(),
            exit_code: output.exit_code,
        });
    }

    let actions = parsed.actions.unwrap_or_default();
    let fetched: HashMap<(&str, &str, &str), &PackageRecord> =
        actions.fetch.iter().map(|r| (r.key(), r)).collect();

    actions
        .link
        .iter()
        .map(|link| to_resolved(link, fetched.get(&link.key()).copied(), platform))
        .collect::<Result<Vec<_>, String>>()
        .map_err(parse_error)
}

fn to_resolved(
    link: &PackageRecord,
    fetch: Option<&PackageRecord>,
    platform: &Platform,
) -> Result<ResolvedPackage, String> {
    let pick = |field: fn(&PackageRecord) -> Option<&String>| {
        fetch.and_then(field).or_else(|| field(link)).cloned()
    };

    let build = pick(PackageRecord::build)
        .ok_or_else(|| format!("package {} {} has no build string", link.name, link.version))?;

    let hash = match (pick(|r| r.sha256.as_ref()), pick(|r| r.md5.as_ref())) {
        (Some(sha256), _) => ArtifactHash::new(HashAlgorithm::Sha256, &sha256),
        (None, Some(md5)) => ArtifactHash::new(HashAlgorithm::Md5, &md5),
        (None, None) => {
            return Err(format!(
                "package {}-{}-{} has no sha256 or md5",
                link.name, link.version, build
            ))
        }
    }
    .map_err(|e| format!("package {}: {}", link.name, e))?;

    let subdir = pick(PackageRecord::subdir);
    let package_platform = match &subdir {
        Some(subdir) => Platform::new(subdir.clone()).map_err(|e| e.to_string())?,
        None => platform.clone(),
    };

    let channel = pick(|r| r.channel.as_ref())
        .or_else(|| pick(|r| r.base_url.as_ref()))
        .map(|raw| channel_name(&raw, package_platform.as_str()))
        .ok_or_else(|| format!("package {} has no channel", link.name))?;

    let depends = fetch
        .map(|r| &r.depends)
        .filter(|d| !d.is_empty())
        .unwrap_or(&link.depends)
        .iter()
        .map(|d| dependency_name(d).to_string())
        .collect();

    Ok(ResolvedPackage {
        name: link.name.clone(),
        version: link.version.clone(),
        build,
        channel,
        platform: package_platform,
        category: Category::main(),
        hash,
        url: pick(|r| r.url.as_ref()),
        depends,
    })
}

/// Reduce a channel URL such as `https://conda.anaconda.org/conda-forge/linux-64`
/// to its name; plain names pass through
pub fn channel_name(raw: &str, subdir: &str) -> String {
    let Some((_, rest)) = raw.split_once("://") else {
        return raw.trim_end_matches('/').to_string();
    };
    let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).skip(1).collect();
    if segments.last().is_some_and(|s| *s == subdir || *s == Platform::NOARCH) {
        segments.pop();
    }
    match segments.last() {
        Some(name) => name.to_string(),
        None => raw.to_string(),
    }
}

fn non_empty(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SHA_ZLIB: &str = "a7d5d9cb3ae7ab1cb1d0bd5da8a55a0b9ab6a31b20b59ee0b4ed6a93bcd1d8a8";
    const SHA_LIBGCC: &str = "3d7d2ec5b3e5d0d8e9a5c38c7b4fa25d3c6c86a06c1e6e41b9c26e16a6e7a701";
    const MD5_PY: &str = "d7c5d57bc0e2d4d40e1d5d0a9e2f0b35";

    fn output(stdout: &str, exit_code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(exit_code),
            duration: Duration::from_millis(5),
        }
    }

    fn linux() -> Platform {
        Platform::new("linux-64").unwrap()
    }

    #[test]
    fn test_conda_link_and_fetch_are_joined() {
        let stdout = format!(
            r#"{{
  "actions": {{
    "FETCH": [
      {{"name": "zlib", "version": "1.2.11", "build": "h516909a_0",
        "channel": "https://conda.anaconda.org/conda-forge/linux-64",
        "subdir": "linux-64",
        "url": "https://conda.anaconda.org/conda-forge/linux-64/zlib-1.2.11-h516909a_0.tar.bz2",
        "md5": "{md5}", "sha256": "{sha}",
        "depends": ["libgcc-ng >=7.3.0"]}}
    ],
    "LINK": [
      {{"name": "zlib", "version": "1.2.11", "build_string": "h516909a_0",
        "channel": "conda-forge", "platform": "linux-64",
        "base_url": "https://conda.anaconda.org/conda-forge"}},
      {{"name": "libgcc-ng", "version": "9.3.0", "build_string": "h5101ec6_17",
        "channel": "conda-forge", "platform": "linux-64",
        "sha256": "{libgcc}"}}
    ]
  }},
  "success": true
}}"#,
            md5 = MD5_PY,
            sha = SHA_ZLIB,
            libgcc = SHA_LIBGCC
        );

        let packages = parse_dry_run(&output(&stdout, 0), "conda", &linux()).unwrap();
        assert_eq!(packages.len(), 2);

        let zlib = &packages[0];
        assert_eq!(zlib.name, "zlib");
        assert_eq!(zlib.build, "h516909a_0");
        assert_eq!(zlib.channel, "conda-forge");
        assert_eq!(zlib.hash, ArtifactHash::sha256(SHA_ZLIB).unwrap());
        assert_eq!(zlib.depends, vec!["libgcc-ng"]);
        assert!(zlib.url.as_deref().unwrap().ends_with(".tar.bz2"));

        let libgcc = &packages[1];
        assert_eq!(libgcc.hash.hex(), SHA_LIBGCC);
        assert!(libgcc.url.is_none());
    }

    #[test]
    fn test_md5_only_package_is_accepted() {
        let stdout = format!(
            r#"{{"actions": {{"LINK": [{{"name": "python", "version": "3.9.7", "build": "h12debd9_1",
              "channel": "https://repo.anaconda.com/pkgs/main/linux-64", "subdir": "linux-64",
              "md5": "{}"}}]}}}}"#,
            MD5_PY
        );
        let packages = parse_dry_run(&output(&stdout, 0), "micromamba", &linux()).unwrap();
        assert_eq!(packages[0].hash, ArtifactHash::md5(MD5_PY).unwrap());
        assert_eq!(packages[0].channel, "main");
    }

    #[test]
    fn test_noarch_subdir_is_kept() {
        let stdout = format!(
            r#"{{"actions": {{"LINK": [{{"name": "six", "version": "1.16.0", "build": "pyh6c4a22f_0",
              "channel": "https://conda.anaconda.org/conda-forge/noarch", "subdir": "noarch",
              "sha256": "{}"}}]}}}}"#,
            SHA_ZLIB
        );
        let packages = parse_dry_run(&output(&stdout, 0), "mamba", &linux()).unwrap();
        assert_eq!(packages[0].platform.as_str(), "noarch");
        assert_eq!(packages[0].channel, "conda-forge");
    }

    #[test]
    fn test_missing_digest_is_parse_error() {
        let stdout = r#"{"actions": {"LINK": [{"name": "zlib", "version": "1.2.11",
            "build_string": "h516909a_0", "channel": "conda-forge"}]}}"#;
        let err = parse_dry_run(&output(stdout, 0), "conda", &linux()).unwrap_err();
        assert!(matches!(err, LockError::SolverOutputParse { ref message, .. } if message.contains("no sha256 or md5")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unsatisfiable_family() {
        for exception in UNSATISFIABLE_EXCEPTIONS {
            let stdout = format!(
                r#"{{"exception_name": "{}", "message": "nothing provides tool >=9", "error": "..."}}"#,
                exception
            );
            let err = parse_dry_run(&output(&stdout, 1), "conda", &linux()).unwrap_err();
            match err {
                LockError::Unsatisfiable { platform, message } => {
                    assert_eq!(platform, "linux-64");
                    assert_eq!(message, "nothing provides tool >=9");
                }
                other => panic!("expected unsatisfiable for {exception}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_other_exception_is_process_error() {
        let stdout = r#"{"exception_name": "CondaHTTPError", "message": "HTTP 000 CONNECTION FAILED"}"#;
        let err = parse_dry_run(&output(stdout, 1), "conda", &linux()).unwrap_err();
        assert!(matches!(err, LockError::SolverProcess { exit_code: Some(1), .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_garbage_output() {
        let err = parse_dry_run(&output("not json", 0), "conda", &linux()).unwrap_err();
        assert!(matches!(err, LockError::SolverOutputParse { .. }));

        let mut crashed = output("", 139);
        crashed.stderr = "Segmentation fault".to_string();
        let err = parse_dry_run(&crashed, "conda", &linux()).unwrap_err();
        assert!(matches!(err, LockError::SolverProcess { ref message, .. } if message == "Segmentation fault"));
    }

    #[test]
    fn test_no_actions_means_empty_set() {
        let stdout = r#"{"success": true, "message": "All requested packages already installed."}"#;
        let packages = parse_dry_run(&output(stdout, 0), "conda", &linux()).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name("conda-forge", "linux-64"), "conda-forge");
        assert_eq!(
            channel_name("https://conda.anaconda.org/conda-forge/linux-64", "linux-64"),
            "conda-forge"
        );
        assert_eq!(channel_name("https://conda.anaconda.org/conda-forge/", "osx-64"), "conda-forge");
        assert_eq!(channel_name("https://repo.anaconda.com/pkgs/main/noarch", "linux-64"), "main");
    }
}
