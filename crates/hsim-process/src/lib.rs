//! ---
//! hsim_section: "03-process-execution"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "External process execution with captured logs."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Runs one external process with its stdout and stderr captured to files.
//!
//! Every build tool and simulation participant in the harness goes through
//! [`run`]: the caller supplies the command line, a working directory and a
//! log base path, and gets back the exit code together with the paths of the
//! captured logs. The stderr log is only written when the process actually
//! produced stderr output, which keeps per-session output directories free of
//! empty files.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result alias used throughout the process crate.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Error type for external process execution.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be spawned at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// Waiting on the child or writing its logs failed.
    #[error("io error while running {program}: {source}")]
    Io {
        /// Program being executed.
        program: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The wall-clock timeout elapsed before the process exited.
    #[error("{program} exceeded its {timeout_secs}s wall-clock timeout")]
    Timeout {
        /// Program that was terminated.
        program: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },
}

/// One external process invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, already fully rendered.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub current_dir: PathBuf,
    /// Base path for the captured logs; `_out.log` / `_err.log` are appended.
    pub log_base: PathBuf,
    /// Optional wall-clock bound. `None` means the process is trusted to
    /// terminate on its own.
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    /// Render the full command line for diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Outcome of a completed process invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code of the child. Signal-terminated children surface `-1`.
    pub exit_code: i32,
    /// Path of the captured stdout log.
    pub stdout_log: PathBuf,
    /// Path of the captured stderr log, if any stderr was produced.
    pub stderr_log: Option<PathBuf>,
}

impl RunOutcome {
    /// Whether the process exited cleanly.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run one external process to completion, capturing its output.
///
/// Stdout is written to `{log_base}_out.log` unconditionally; stderr is
/// written to `{log_base}_err.log` only when non-empty. When a timeout is
/// configured and elapses, the child is killed and
/// [`ProcessError::Timeout`] is returned instead of an exit code.
pub async fn run(spec: &ProcessSpec) -> Result<RunOutcome> {
    let program = spec.program.display().to_string();
    debug!(command = %spec.command_line(), cwd = %spec.current_dir.display(), "spawning process");

    let child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.current_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // A dropped wait future must not leave the child running; this is
        // what terminates the process when the timeout elapses below.
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let wait = child.wait_with_output();
    let output = match spec.timeout {
        None => wait.await,
        Some(timeout) => match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(program = %program, timeout_secs = timeout.as_secs(), "process timed out, killing");
                return Err(ProcessError::Timeout {
                    program,
                    timeout_secs: timeout.as_secs(),
                });
            }
        },
    }
    .map_err(|source| ProcessError::Io {
        program: program.clone(),
        source,
    })?;

    let (stdout_log, stderr_log) =
        save_logs(spec, &program, &output.stdout, &output.stderr).await?;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(program = %program, exit_code, "process finished");

    Ok(RunOutcome {
        exit_code,
        stdout_log,
        stderr_log,
    })
}

async fn save_logs(
    spec: &ProcessSpec,
    program: &str,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<(PathBuf, Option<PathBuf>)> {
    let io_err = |source| ProcessError::Io {
        program: program.to_owned(),
        source,
    };

    if let Some(parent) = spec.log_base.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let stdout_log = log_path(&spec.log_base, "_out.log");
    tokio::fs::write(&stdout_log, stdout).await.map_err(io_err)?;

    let stderr_log = if stderr.is_empty() {
        None
    } else {
        let path = log_path(&spec.log_base, "_err.log");
        tokio::fs::write(&path, stderr).await.map_err(io_err)?;
        Some(path)
    };

    Ok((stdout_log, stderr_log))
}

fn log_path(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dir: &std::path::Path, program: &str, args: &[&str]) -> ProcessSpec {
        ProcessSpec {
            program: PathBuf::from(program),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            current_dir: dir.to_path_buf(),
            log_base: dir.join("proc"),
            timeout: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn captures_stdout_and_skips_empty_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = spec(dir.path(), "/bin/sh", &["-c", "echo hello"]);

        let outcome = run(&spec).await.expect("run succeeds");
        assert_eq!(outcome.exit_code, 0);
        let stdout = std::fs::read_to_string(&outcome.stdout_log).expect("stdout log");
        assert_eq!(stdout.trim(), "hello");
        assert!(outcome.stderr_log.is_none(), "no stderr log for empty stderr");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_stderr_log_when_non_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = spec(dir.path(), "/bin/sh", &["-c", "echo oops >&2; exit 3"]);

        let outcome = run(&spec).await.expect("run completes");
        assert_eq!(outcome.exit_code, 3);
        let stderr_log = outcome.stderr_log.expect("stderr log written");
        let stderr = std::fs::read_to_string(stderr_log).expect("stderr contents");
        assert_eq!(stderr.trim(), "oops");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_kills_and_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut spec = spec(dir.path(), "/bin/sh", &["-c", "sleep 30"]);
        spec.timeout = Some(Duration::from_millis(200));

        let err = run(&spec).await.expect_err("must time out");
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = spec(dir.path(), "/nonexistent/hsim-no-such-exe", &[]);

        let err = run(&spec).await.expect_err("spawn must fail");
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn command_line_renders_in_order() {
        let spec = ProcessSpec {
            program: PathBuf::from("exe"),
            args: vec!["-s=s1".into(), "-d=0".into()],
            current_dir: PathBuf::from("."),
            log_base: PathBuf::from("log"),
            timeout: None,
        };
        assert_eq!(spec.command_line(), "exe -s=s1 -d=0");
    }
}
