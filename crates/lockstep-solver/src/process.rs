//! Bounded subprocess execution for solver invocations.
//!
//! The child is spawned with `kill_on_drop`, so every exit path out of
//! [`run_solver`] (timeout, cancellation of the calling task, panic) tears the
//! process down with it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use lockstep_core::error::LockError;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::SolverResult;

/// Maximum stderr characters carried into error messages
const STDERR_TAIL: usize = 2000;

/// A fully described solver invocation
#[derive(Debug, Clone)]
pub struct SolverCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub timeout: Duration,
}

/// What a finished solver process produced
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last part of stderr, for error reports
    pub fn stderr_tail(&self) -> &str {
        let trimmed = self.stderr.trim();
        match trimmed.char_indices().rev().nth(STDERR_TAIL) {
            Some((idx, _)) => &trimmed[idx..],
            None => trimmed,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

impl SolverCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Run a solver process to completion or until its timeout elapses.
///
/// A non-zero exit is not an error here: solvers report unsatisfiable specs
/// through their output, so callers inspect [`ProcessOutput`] themselves.
pub async fn run_solver(
    command: &SolverCommand,
    solver: &str,
    platform: &str,
) -> SolverResult<ProcessOutput> {
    let started = Instant::now();
    debug!(
        "spawning {} for {}: {} {:?}",
        solver,
        platform,
        command.program.display(),
        command.args
    );

    let child = Command::new(&command.program)
        .args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LockError::SolverProcess {
            solver: solver.to_string(),
            platform: platform.to_string(),
            message: format!("failed to spawn {}: {}", command.program.display(), e),
            exit_code: None,
        })?;

    // Dropping the wait future on timeout drops the child and kills it
    let output = match tokio::time::timeout(command.timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| LockError::SolverProcess {
            solver: solver.to_string(),
            platform: platform.to_string(),
            message: format!("failed to collect output: {}", e),
            exit_code: None,
        })?,
        Err(_) => {
            let timeout_secs = whole_seconds(command.timeout);
            warn!("{} on {} exceeded {}s, killed", solver, platform, timeout_secs);
            return Err(LockError::SolverTimeout {
                solver: solver.to_string(),
                platform: platform.to_string(),
                timeout_secs,
            });
        }
    };

    let output = ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
        duration: started.elapsed(),
    };
    debug!(
        "{} on {} exited with {:?} after {}ms",
        solver,
        platform,
        output.exit_code,
        output.duration_ms()
    );
    Ok(output)
}

/// Seconds rounded up, so a sub-second timeout never reports as 0s
fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_support::write_script;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "solver", "echo \"$1 $SUBDIR\"\necho oops >&2\nexit 3");

        let command = SolverCommand::new(&script, Duration::from_secs(10))
            .arg("hello")
            .env("SUBDIR", "linux-64");
        let output = run_solver(&command, "fake", "linux-64").await.unwrap();

        assert_eq!(output.stdout.trim(), "hello linux-64");
        assert_eq!(output.stderr_tail(), "oops");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let script = write_script(
            dir.path(),
            "solver",
            &format!("sleep 5\ntouch {}", marker.display()),
        );

        let command = SolverCommand::new(&script, Duration::from_millis(200));
        let started = Instant::now();
        let err = run_solver(&command, "fake", "osx-64").await.unwrap_err();

        assert!(matches!(
            err,
            LockError::SolverTimeout { ref platform, timeout_secs: 1, .. } if platform == "osx-64"
        ));
        assert!(err.to_string().contains("after 1s"));
        assert!(started.elapsed() < Duration::from_secs(4));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn test_timeout_seconds_round_up() {
        assert_eq!(whole_seconds(Duration::from_millis(200)), 1);
        assert_eq!(whole_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(whole_seconds(Duration::from_secs(600)), 600);
        assert_eq!(whole_seconds(Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn test_missing_executable_is_process_error() {
        let command = SolverCommand::new("/nonexistent/solver", Duration::from_secs(1));
        let err = run_solver(&command, "fake", "linux-64").await.unwrap_err();
        assert!(matches!(err, LockError::SolverProcess { exit_code: None, .. }));
        assert!(err.is_retryable());
    }
}
