//! Locating the solver executable

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use lockstep_config::{SolverKind, SolverSection};
use lockstep_core::error::LockError;
use tracing::debug;

use crate::SolverResult;

/// PATH search order for `kind = "auto"`
const AUTO_ORDER: [SolverKind; 3] = [SolverKind::Micromamba, SolverKind::Mamba, SolverKind::Conda];

/// Find the solver executable and the concrete kind it belongs to.
///
/// Order: `solver.executable`, then `$CONDA_EXE` (for `auto` and `conda`),
/// then the first matching executable on `$PATH`.
pub fn discover_solver(section: &SolverSection) -> SolverResult<(PathBuf, SolverKind)> {
    discover_in(
        section,
        std::env::var_os("CONDA_EXE"),
        std::env::var_os("PATH"),
    )
}

pub(crate) fn discover_in(
    section: &SolverSection,
    conda_exe: Option<OsString>,
    search_path: Option<OsString>,
) -> SolverResult<(PathBuf, SolverKind)> {
    if let Some(executable) = &section.executable {
        if !executable.is_file() {
            return Err(LockError::ConfigValidation {
                field: "solver.executable".to_string(),
                reason: format!("{} does not exist", executable.display()),
            });
        }
        let kind = concrete_kind(section.kind, executable);
        debug!("using configured {} at {}", kind, executable.display());
        return Ok((executable.clone(), kind));
    }

    if matches!(section.kind, SolverKind::Auto | SolverKind::Conda) {
        if let Some(conda_exe) = conda_exe.map(PathBuf::from).filter(|p| p.is_file()) {
            let kind = concrete_kind(section.kind, &conda_exe);
            debug!("using {} from CONDA_EXE at {}", kind, conda_exe.display());
            return Ok((conda_exe, kind));
        }
    }

    let candidates: &[SolverKind] = match section.kind {
        SolverKind::Auto => &AUTO_ORDER,
        SolverKind::Conda => &[SolverKind::Conda],
        SolverKind::Mamba => &[SolverKind::Mamba],
        SolverKind::Micromamba => &[SolverKind::Micromamba],
    };
    for kind in candidates {
        if let Ok(found) = which::which_in(kind.as_str(), search_path.as_ref(), ".") {
            debug!("found {} on PATH at {}", kind, found.display());
            return Ok((found, *kind));
        }
    }

    Err(LockError::ConfigValidation {
        field: "solver.executable".to_string(),
        reason: format!(
            "no {} executable found; set solver.executable or CONDA_EXE",
            match section.kind {
                SolverKind::Auto => "micromamba, mamba or conda".to_string(),
                kind => kind.to_string(),
            }
        ),
    })
}

/// Resolve `auto` by looking at the executable's file name
fn concrete_kind(configured: SolverKind, executable: &Path) -> SolverKind {
    if configured != SolverKind::Auto {
        return configured;
    }
    let stem = executable
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if stem.starts_with("micromamba") {
        SolverKind::Micromamba
    } else if stem.starts_with("mamba") {
        SolverKind::Mamba
    } else {
        SolverKind::Conda
    }
}
