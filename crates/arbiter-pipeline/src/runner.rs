//! Process-runner boundary for the external evaluator and query tool.
//!
//! Everything that spawns a child process goes through [`ProcessRunner`], so
//! the tools can be swapped for in-process implementations (see
//! [`crate::fakes`]) without touching the resolver or the assertion engine.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub binary: String,
    pub args: Vec<String>,
    /// Working directory; inherits the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Wall-clock limit. `Duration::ZERO` disables the limit.
    pub timeout: Duration,
}

impl ProcessRequest {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            cwd: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors for processes that could not be run to completion.
///
/// A non-zero exit is not an error here; it is reported in [`ProcessOutput`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{binary}' timed out after {timeout_ms}ms")]
    Timeout { binary: String, timeout_ms: u64 },

    #[error("failed waiting on '{binary}': {source}")]
    Wait {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout { .. })
    }
}

/// Runs external processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, RunnerError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so a timeout (or a dropped
/// caller future) terminates the process instead of leaking it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, RunnerError> {
        let start = Instant::now();

        let mut command = Command::new(&request.binary);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|source| RunnerError::Spawn {
            binary: request.binary.clone(),
            source,
        })?;

        let output = if request.timeout > Duration::ZERO {
            // Dropping the wait future on expiry drops the child, which kills it.
            tokio::time::timeout(request.timeout, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    binary: request.binary.clone(),
                    timeout_ms: request.timeout.as_millis() as u64,
                })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|source| RunnerError::Wait {
            binary: request.binary.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(binary = %request.binary, exit_code, duration_ms, "Process finished");

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_success() {
        let output = ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        };
        assert!(output.success());
        assert!(!ProcessOutput { exit_code: 2, ..output }.success());
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let request = ProcessRequest::new("echo", vec!["hello".to_string()])
            .with_timeout(Duration::from_secs(10));
        let output = TokioProcessRunner::new().run(&request).await.expect("run failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let request = ProcessRequest::new("false", vec![]);
        let output = TokioProcessRunner::new().run(&request).await.expect("run failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_run_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let request = ProcessRequest::new("pwd", vec![]).in_dir(dir.path());
        let output = TokioProcessRunner::new().run(&request).await.expect("run failed");
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let request = ProcessRequest::new("sleep", vec!["5".to_string()])
            .with_timeout(Duration::from_millis(100));
        let err = TokioProcessRunner::new().run(&request).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("100ms"));
    }

    /// Running and not a zombie.
    #[cfg(target_os = "linux")]
    fn process_alive(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_run_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 5", pid_file.display());
        let request = ProcessRequest::new("sh", vec!["-c".to_string(), script])
            .with_timeout(Duration::from_millis(300));

        let err = TokioProcessRunner::new().run(&request).await.unwrap_err();
        assert!(err.is_timeout());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        for _ in 0..40 {
            if !process_alive(&pid) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process_alive(&pid), "child {pid} outlived its timeout");
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let request = ProcessRequest::new("arbiter-no-such-binary", vec![]);
        let err = TokioProcessRunner::new().run(&request).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
