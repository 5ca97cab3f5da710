//! Remote session driver: run one command in a sandbox shell and report
//! what happened.
//!
//! The driver wraps the command (see [`wrap`]), hands it to the sandbox
//! capability under a local deadline, recovers the post-command directory
//! from the sentinel trailer (see [`parse`]), bounds the output and
//! classifies failures (see [`classify`]). Session handles are owned by the
//! caller; the driver never stores them and assumes calls on one session are
//! serialized by the caller.

pub mod classify;
pub mod parse;
pub mod wrap;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use self::classify::{classify, session_fault_marker, Classification};
use self::parse::split_sentinel;
use self::wrap::{new_sentinel, wrap_command, WrapSpec};
use crate::config::SessionConfig;
use crate::context::ExecutionContext;
use crate::metrics::METRICS;
use crate::obs;
use crate::result::{ToolError, ToolErrorKind, ToolMeta, ToolResult};
use crate::sandbox::{ExecOptions, ExecOutput, SandboxCapability, SandboxIoError};
use crate::truncate::truncate_utf8;

/// Per-call adjustments to how a command is run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOverrides {
    /// Force this directory even when a session is in use.
    pub cwd: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Run in this machine instead of the context's sandbox.
    pub sandbox_id: Option<String>,
    /// Ignore the context's session and use a fresh shell.
    pub one_shot: bool,
}

pub struct SessionDriver {
    sandbox: Arc<dyn SandboxCapability>,
    config: SessionConfig,
}

fn first_line(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().trim();
    truncate_utf8(line, 200).kept.to_string()
}

impl SessionDriver {
    pub fn new(sandbox: Arc<dyn SandboxCapability>, config: SessionConfig) -> Self {
        Self { sandbox, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run `command` and fold the outcome into a [`ToolResult`].
    #[instrument(
        skip(self, ctx, command, overrides),
        fields(run_id = %ctx.run_id, sandbox_id = tracing::field::Empty, session = ctx.session.is_some())
    )]
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        command: &str,
        overrides: &ExecOverrides,
    ) -> ToolResult {
        let sandbox_id = overrides.sandbox_id.as_deref().unwrap_or(&ctx.sandbox_id);
        tracing::Span::current().record("sandbox_id", sandbox_id);

        let session = if overrides.one_shot {
            None
        } else {
            ctx.session.clone()
        };
        let cwd = match (&session, &overrides.cwd) {
            (_, Some(forced)) => Some(forced.as_str()),
            (None, None) => Some(ctx.cwd.as_str()),
            (Some(_), None) => None,
        };

        let sentinel = new_sentinel();
        let script = wrap_command(
            &WrapSpec {
                env_prefix: &self.config.env_prefix,
                env_file: &self.config.env_file,
                cwd,
                sentinel: &sentinel,
            },
            command,
        );

        let timeout_ms = overrides.timeout_ms.unwrap_or(self.config.command_timeout_ms);
        let deadline_ms = timeout_ms.saturating_add(self.config.timeout_grace_ms);
        let opts = ExecOptions {
            session: session.clone(),
            cwd: cwd.map(str::to_string),
            timeout_ms,
        };

        debug!(timeout_ms, deadline_ms, "dispatching command");
        let answered = tokio::time::timeout(
            Duration::from_millis(deadline_ms),
            self.sandbox.exec_command(sandbox_id, &script, opts),
        )
        .await;

        match answered {
            Err(_elapsed) => {
                obs::emit_session_fault(
                    &ctx.run_id,
                    sandbox_id,
                    ToolErrorKind::RequestTimedOut,
                    None,
                    session.is_some(),
                );
                METRICS.inc_session_faults();
                let meta = ToolMeta {
                    timed_out: true,
                    // The remote shell is still busy with the command.
                    session_invalidated: session.is_some(),
                    ..ToolMeta::default()
                };
                ToolResult::failure(
                    ToolError::RequestTimedOut {
                        timeout_ms: deadline_ms,
                    },
                    "",
                    meta,
                )
            }
            Ok(Err(err)) => self.transport_failure(ctx, sandbox_id, session.is_some(), err),
            Ok(Ok(output)) => self.finish(ctx, sandbox_id, session.is_some(), &sentinel, output),
        }
    }

    fn transport_failure(
        &self,
        ctx: &ExecutionContext,
        sandbox_id: &str,
        session_in_use: bool,
        err: SandboxIoError,
    ) -> ToolResult {
        let text = err.to_string();
        match session_fault_marker(&text) {
            Some(_) => {
                obs::emit_session_fault(
                    &ctx.run_id,
                    sandbox_id,
                    ToolErrorKind::SessionError,
                    None,
                    session_in_use,
                );
                METRICS.inc_session_faults();
                ToolError::SessionError {
                    exit_code: None,
                    detail: text,
                }
                .into()
            }
            None => ToolError::SandboxUnavailable { detail: text }.into(),
        }
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        sandbox_id: &str,
        session_in_use: bool,
        sentinel: &str,
        output: ExecOutput,
    ) -> ToolResult {
        let parsed = split_sentinel(&output.stdout, sentinel);
        let stdout = truncate_utf8(&parsed.body, self.config.max_stdout_bytes);
        let stderr = truncate_utf8(&output.stderr, self.config.max_stderr_bytes);

        let mut text = stdout.kept.to_string();
        if stdout.was_truncated() {
            text.push_str(&format!(
                "\n[stdout truncated: omitted {} bytes]",
                stdout.omitted_bytes
            ));
            text.push_str(&format!(
                "\n[exit code: {}, duration: {}ms]",
                output.exit_code, output.duration_ms
            ));
            obs::emit_output_truncated(&ctx.run_id, "exec", stdout.omitted_bytes);
            METRICS.inc_truncations();
        }
        if !stderr.kept.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(stderr.kept);
            if stderr.was_truncated() {
                text.push_str(&format!(
                    "\n[stderr truncated: omitted {} bytes]",
                    stderr.omitted_bytes
                ));
            }
        }

        let meta = ToolMeta {
            cwd: parsed.cwd,
            exit_code: Some(output.exit_code),
            duration_ms: Some(output.duration_ms),
            truncated: stdout.was_truncated(),
            omitted_bytes: stdout.was_truncated().then_some(stdout.omitted_bytes),
            ..ToolMeta::default()
        };

        let error = match classify(output.exit_code, &output.stderr) {
            Classification::Succeeded => return ToolResult::ok_with_meta(text, meta),
            Classification::Failed => ToolError::CommandFailed {
                exit_code: output.exit_code,
                detail: first_line(&output.stderr),
            },
            Classification::TimedOutInPlace => {
                let meta = ToolMeta {
                    timed_out: true,
                    ..meta
                };
                return ToolResult::failure(
                    ToolError::CommandFailed {
                        exit_code: output.exit_code,
                        detail: "command timed out and was interrupted; the shell is still usable"
                            .to_string(),
                    },
                    text,
                    meta,
                );
            }
            Classification::SessionReset => ToolError::SessionInvalidated {
                exit_code: output.exit_code,
                detail: first_line(&output.stderr),
            },
            Classification::SessionFault(marker) => ToolError::SessionError {
                exit_code: Some(output.exit_code),
                detail: marker.to_string(),
            },
        };

        if matches!(
            error,
            ToolError::SessionError { .. } | ToolError::SessionInvalidated { .. }
        ) {
            obs::emit_session_fault(
                &ctx.run_id,
                sandbox_id,
                error.kind(),
                Some(output.exit_code),
                session_in_use,
            );
            METRICS.inc_session_faults();
        }
        ToolResult::failure(error, text, meta)
    }
}
