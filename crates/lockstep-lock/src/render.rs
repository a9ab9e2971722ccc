//! Rendering lock documents as conda explicit environment files.
//!
//! The renderer only reads documents. One file is produced per locked
//! platform, listing `url#digest` lines in canonical package order.

use camino::{Utf8Path, Utf8PathBuf};
use lockstep_core::error::LockError;
use lockstep_core::{LockResult, Platform};
use tracing::info;

use crate::document::LockDocument;

/// Substitute `{platform}` and `{dev-dependencies}` in a file name pattern
pub fn lock_filename(format: &str, platform: &Platform, include_dev: bool) -> String {
    format
        .replace("{platform}", platform.as_str())
        .replace("{dev-dependencies}", if include_dev { "true" } else { "false" })
}

/// Render one platform of a document as an explicit file
pub fn render_explicit(
    document: &LockDocument,
    platform: &Platform,
    include_dev: bool,
) -> LockResult<String> {
    let lock = document.platform(platform).ok_or_else(|| {
        LockError::invalid_spec(format!("platform {} is not present in the lock", platform))
    })?;

    let mut lines = vec![
        "# Generated by lockstep".to_string(),
        format!("# platform: {}", platform),
        format!("# input_hash: {}", document.spec_fingerprint()),
        "@EXPLICIT".to_string(),
    ];
    for package in &lock.packages {
        if !include_dev && !package.category.is_main() {
            continue;
        }
        let url = package.url.as_deref().ok_or_else(|| LockError::Serialization {
            message: format!(
                "{} on {} has no download url and cannot be rendered",
                package.pin(),
                platform
            ),
        })?;
        lines.push(format!("{}#{}", url, package.hash.hex()));
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    Ok(rendered)
}

/// Write explicit files for every locked platform into `dir`
pub async fn write_explicit_files(
    document: &LockDocument,
    dir: &Utf8Path,
    format: &str,
    include_dev: bool,
) -> LockResult<Vec<Utf8PathBuf>> {
    let mut written = Vec::with_capacity(document.platforms().len());
    for platform in document.platforms().keys() {
        let content = render_explicit(document, platform, include_dev)?;
        let path = dir.join(lock_filename(format, platform, include_dev));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| LockError::io(format!("Failed to write {}", path), e))?;
        info!("rendered {}", path);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::LockMerger;
    use lockstep_core::{
        ArtifactHash, Category, ConstraintEntry, LockSpec, PlatformOutcomes, PlatformResolution,
        ResolvedPackage, SolverMetadata,
    };
    use tempfile::TempDir;

    fn package(name: &str, category: Category, url: Option<&str>) -> ResolvedPackage {
        ResolvedPackage {
            name: name.to_string(),
            version: "1.0".to_string(),
            build: "0".to_string(),
            channel: "conda-forge".to_string(),
            platform: Platform::new("linux-64").unwrap(),
            category,
            hash: ArtifactHash::md5(&"9a".repeat(16)).unwrap(),
            url: url.map(str::to_string),
            depends: Vec::new(),
        }
    }

    fn document(packages: Vec<ResolvedPackage>) -> LockDocument {
        let spec = LockSpec::new(
            vec![
                ConstraintEntry::parse("python", Category::main()).unwrap(),
                ConstraintEntry::parse("pytest", Category::dev()).unwrap(),
            ],
            vec!["conda-forge".to_string()],
            vec![Platform::new("linux-64").unwrap()],
        )
        .unwrap();
        let linux = Platform::new("linux-64").unwrap();
        let outcomes = PlatformOutcomes::from([(
            linux.clone(),
            Ok(PlatformResolution {
                platform: linux,
                packages,
                solver: SolverMetadata {
                    name: "conda".to_string(),
                    version: "23.1.0".to_string(),
                    duration_ms: 1,
                    exit_code: Some(0),
                },
            }),
        )]);
        LockMerger::new().merge(&spec, None, outcomes).unwrap().document
    }

    fn sample() -> LockDocument {
        document(vec![
            package("python", Category::main(), Some("https://example.org/linux-64/python-1.0-0.conda")),
            package("pytest", Category::dev(), Some("https://example.org/linux-64/pytest-1.0-0.conda")),
        ])
    }

    #[test]
    fn test_lock_filename() {
        let linux = Platform::new("linux-64").unwrap();
        assert_eq!(
            lock_filename("conda-{platform}-{dev-dependencies}.lock", &linux, true),
            "conda-linux-64-true.lock"
        );
        assert_eq!(lock_filename("{platform}.lock", &linux, false), "linux-64.lock");
    }

    #[test]
    fn test_render_explicit() {
        let document = sample();
        let linux = Platform::new("linux-64").unwrap();
        let rendered = render_explicit(&document, &linux, true).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[1], "# platform: linux-64");
        assert_eq!(lines[2], format!("# input_hash: {}", document.spec_fingerprint()));
        assert_eq!(lines[3], "@EXPLICIT");
        // Canonical order: pytest sorts before python
        assert_eq!(lines[4], format!("https://example.org/linux-64/pytest-1.0-0.conda#{}", "9a".repeat(16)));
        assert!(lines[5].starts_with("https://example.org/linux-64/python-1.0-0.conda#"));

        let without_dev = render_explicit(&document, &linux, false).unwrap();
        assert!(!without_dev.contains("pytest"));
        assert!(without_dev.contains("python"));
    }

    #[test]
    fn test_render_errors() {
        let locked = sample();
        let err = render_explicit(&locked, &Platform::new("osx-64").unwrap(), true).unwrap_err();
        assert!(matches!(err, LockError::InvalidSpec { .. }));

        let no_url = document(vec![package("python", Category::main(), None)]);
        let err = render_explicit(&no_url, &Platform::new("linux-64").unwrap(), true).unwrap_err();
        assert!(err.to_string().contains("no download url"));
    }

    #[tokio::test]
    async fn test_write_explicit_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let written = write_explicit_files(&sample(), &dir, "conda-{platform}.lock", true)
            .await
            .unwrap();
        assert_eq!(written, vec![dir.join("conda-linux-64.lock")]);
        let content = tokio::fs::read_to_string(&written[0]).await.unwrap();
        assert!(content.contains("@EXPLICIT"));
    }
}
