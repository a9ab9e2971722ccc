//! Common utilities for benchmarks

use criterion::Criterion;
use lockstep_core::{
    ArtifactHash, Category, ConstraintEntry, LockSpec, Platform, PlatformOutcomes,
    PlatformResolution, ResolvedPackage, SolverMetadata,
};
use pprof::criterion::{Output, PProfProfiler};

pub const PLATFORMS: [&str; 5] = ["linux-64", "linux-aarch64", "osx-64", "osx-arm64", "win-64"];

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

pub fn platforms(count: usize) -> Vec<Platform> {
    PLATFORMS
        .iter()
        .take(count)
        .filter_map(|p| Platform::new(*p).ok())
        .collect()
}

/// A spec with `constraints` entries, every tenth one in `dev`
pub fn synthetic_spec(constraints: usize, platform_count: usize) -> LockSpec {
    let entries = (0..constraints)
        .filter_map(|i| {
            let category = if i % 10 == 9 { Category::dev() } else { Category::main() };
            ConstraintEntry::parse(&format!("pkg-{i}>=1.{i},<2"), category).ok()
        })
        .collect();
    match LockSpec::new(
        entries,
        vec!["conda-forge".to_string(), "defaults".to_string()],
        platforms(platform_count),
    ) {
        Ok(spec) => spec,
        Err(e) => panic!("synthetic spec is invalid: {e}"),
    }
}

/// `count` packages for one platform, each depending on its successor
pub fn synthetic_packages(count: usize, platform: &Platform) -> Vec<ResolvedPackage> {
    (0..count)
        .map(|i| ResolvedPackage {
            name: format!("pkg-{i}"),
            version: format!("1.{i}.0"),
            build: format!("h{:07x}_0", i * 7919),
            channel: "conda-forge".to_string(),
            platform: platform.clone(),
            category: Category::main(),
            hash: sha256_for(i),
            url: Some(format!(
                "https://conda.anaconda.org/conda-forge/{platform}/pkg-{i}-1.{i}.0-h_0.conda"
            )),
            depends: if i + 1 < count {
                vec![format!("pkg-{} >=1", i + 1)]
            } else {
                Vec::new()
            },
        })
        .collect()
}

fn sha256_for(i: usize) -> ArtifactHash {
    let digest = format!("{:064x}", i as u128 * 0x9e37_79b9_7f4a_7c15);
    match ArtifactHash::sha256(&digest) {
        Ok(hash) => hash,
        Err(e) => panic!("synthetic digest is invalid: {e}"),
    }
}

/// Successful outcomes for every platform of `spec`, packages in reverse order
pub fn synthetic_outcomes(spec: &LockSpec, packages: usize) -> PlatformOutcomes {
    spec.platforms()
        .iter()
        .map(|platform| {
            let mut packages = synthetic_packages(packages, platform);
            packages.reverse();
            let resolution = PlatformResolution {
                platform: platform.clone(),
                packages,
                solver: SolverMetadata {
                    name: "conda".to_string(),
                    version: "23.1.0".to_string(),
                    duration_ms: 1500,
                    exit_code: Some(0),
                },
            };
            (platform.clone(), Ok(resolution))
        })
        .collect()
}

/// An environment.yml with `count` dependencies
pub fn environment_yaml_content(count: usize) -> String {
    let mut content = String::from("channels:\n  - conda-forge\n  - defaults\ndependencies:\n");
    for i in 0..count {
        content.push_str(&format!("  - pkg-{i} >=1.{i},<2\n"));
    }
    content.push_str("  - pip:\n    - requests\n");
    content
}

/// A poetry pyproject.toml with `count` main and `count / 4` dev dependencies
pub fn poetry_pyproject_content(count: usize) -> String {
    let mut content = String::from(
        "[tool.poetry]\nname = \"bench\"\nversion = \"0.1.0\"\n\n[tool.poetry.dependencies]\npython = \"^3.9\"\n",
    );
    for i in 0..count {
        content.push_str(&format!("pkg-{i} = \"^1.{i}\"\n"));
    }
    content.push_str("\n[tool.poetry.dev-dependencies]\n");
    for i in 0..count / 4 {
        content.push_str(&format!("devpkg-{i} = \"~{i}.1\"\n"));
    }
    content.push_str("\n[tool.lockstep]\nchannels = [\"conda-forge\"]\n");
    content
}
