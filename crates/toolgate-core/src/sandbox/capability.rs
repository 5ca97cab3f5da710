//! The remote execution capability every tool ultimately talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SandboxResult;
use crate::context::SessionHandle;

/// Per-command options handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Persistent shell to run in; `None` means a fresh one-shot shell.
    pub session: Option<SessionHandle>,
    /// Directory hint for backends that start a fresh shell.
    pub cwd: Option<String>,
    pub timeout_ms: u64,
}

/// Raw result of one command, before any parsing or truncation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

/// Opaque "run this in sandbox X" / "read or write a file in sandbox X".
///
/// The VM lifecycle behind it is out of scope; implementations must be safe
/// to share across concurrent runs targeting different sandboxes.
#[async_trait]
pub trait SandboxCapability: Send + Sync {
    async fn exec_command(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: ExecOptions,
    ) -> SandboxResult<ExecOutput>;

    async fn read_file(&self, sandbox_id: &str, path: &str) -> SandboxResult<String>;

    async fn write_file(&self, sandbox_id: &str, path: &str, content: &str) -> SandboxResult<()>;
}
