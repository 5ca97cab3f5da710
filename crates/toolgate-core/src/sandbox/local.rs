//! A `SandboxCapability` backed by the local host.
//!
//! Commands run through `sh -c` in a fresh process; file paths are host
//! paths. There is no persistent shell, so a session handle is accepted but
//! each call still starts clean. Used by the CLI and by integration tests.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::capability::{ExecOptions, ExecOutput, SandboxCapability};
use super::error::{SandboxIoError, SandboxResult};

/// Exit code reported when the local timeout kills a command.
pub const LOCAL_TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone)]
pub struct LocalShellSandbox {
    shell: String,
}

impl Default for LocalShellSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShellSandbox {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl SandboxCapability for LocalShellSandbox {
    async fn exec_command(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: ExecOptions,
    ) -> SandboxResult<ExecOutput> {
        debug!(sandbox_id, shell = %self.shell, "spawning local shell");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = opts.cwd.as_deref() {
            if Path::new(cwd).is_dir() {
                cmd.current_dir(cwd);
            }
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| SandboxIoError::Unavailable {
            sandbox_id: sandbox_id.to_string(),
            reason: format!("failed to spawn {}: {e}", self.shell),
        })?;

        let waited =
            tokio::time::timeout(Duration::from_millis(opts.timeout_ms), child.wait_with_output())
                .await;

        match waited {
            Ok(Ok(output)) => Ok(ExecOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                // Signal-terminated processes have no exit code.
                exit_code: output.status.code().unwrap_or(-1),
                duration_ms: elapsed_ms(start),
            }),
            Ok(Err(e)) => Err(SandboxIoError::Transport(format!(
                "failed to collect command output: {e}"
            ))),
            // The child is dropped with the future and killed via kill_on_drop.
            Err(_) => Ok(ExecOutput {
                stdout: String::new(),
                stderr: format!(
                    "command timed out after {}ms and was interrupted",
                    opts.timeout_ms
                ),
                exit_code: LOCAL_TIMEOUT_EXIT_CODE,
                duration_ms: elapsed_ms(start),
            }),
        }
    }

    async fn read_file(&self, _sandbox_id: &str, path: &str) -> SandboxResult<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SandboxIoError::NotFound {
                path: path.to_string(),
            },
            _ => SandboxIoError::Io {
                path: path.to_string(),
                message: e.to_string(),
            },
        })
    }

    async fn write_file(&self, _sandbox_id: &str, path: &str, content: &str) -> SandboxResult<()> {
        let io_err = |e: std::io::Error| SandboxIoError::Io {
            path: path.to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        tokio::fs::write(path, content).await.map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(timeout_ms: u64) -> ExecOptions {
        ExecOptions {
            session: None,
            cwd: None,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn runs_command_and_captures_streams() {
        let sandbox = LocalShellSandbox::new();
        let out = sandbox
            .exec_command("local", "echo out; echo err 1>&2; exit 3", opts(5_000))
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn timeout_reports_exit_124() {
        let sandbox = LocalShellSandbox::new();
        let out = sandbox
            .exec_command("local", "sleep 5", opts(100))
            .await
            .unwrap();
        assert_eq!(out.exit_code, LOCAL_TIMEOUT_EXIT_CODE);
        assert!(out.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn file_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/notes.txt");
        let path = path.to_str().unwrap();
        let sandbox = LocalShellSandbox::new();

        sandbox.write_file("local", path, "hello\n").await.unwrap();
        assert_eq!(sandbox.read_file("local", path).await.unwrap(), "hello\n");

        let missing = dir.path().join("absent.txt");
        let err = sandbox
            .read_file("local", missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxIoError::NotFound { .. }));
    }
}
