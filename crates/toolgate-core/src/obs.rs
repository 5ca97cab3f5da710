//! Structured observability hooks for tool-call lifecycle events.
//!
//! This module provides:
//! - Call-scoped tracing spans via the `ToolSpan` RAII guard
//! - Emission functions for lifecycle events: tool start/finish, session
//!   faults, anchor mismatches, policy sync, credential requests
//!
//! Events are emitted at `info!` (faults at `warn!`). Filtering follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`] for JSON output.
//! No function here accepts secret material.

use tracing::{info, warn};

use crate::result::ToolErrorKind;

/// Span tagged with the run, agent and tool for one tool call.
///
/// Async callers attach it with `Instrument::instrument(span.span())`;
/// synchronous callers can hold the guard from [`ToolSpan::enter`].
///
/// # Example
///
/// ```ignore
/// let span = ToolSpan::new("agent-1", "run-12345", "exec");
/// let result = dispatch_inner(call).instrument(span.span()).await;
/// ```
pub struct ToolSpan {
    span: tracing::Span,
}

impl ToolSpan {
    pub fn new(agent_id: &str, run_id: &str, tool: &str) -> Self {
        let span = tracing::info_span!(
            "toolgate.call",
            agent_id = %agent_id,
            run_id = %run_id,
            tool = %tool,
        );
        Self { span }
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }

    /// Enter the span until the guard drops. Not for use across `.await`.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Emit event: tool call accepted by the dispatcher.
pub fn emit_tool_started(run_id: &str, agent_id: &str, tool: &str, sandbox_id: &str) {
    info!(
        event = "tool.started",
        run_id = %run_id,
        agent_id = %agent_id,
        tool = %tool,
        sandbox_id = %sandbox_id,
    );
}

/// Emit event: tool call finished, successfully or not.
pub fn emit_tool_finished(
    run_id: &str,
    tool: &str,
    duration_ms: u64,
    success: bool,
    error_kind: Option<ToolErrorKind>,
) {
    info!(
        event = "tool.finished",
        run_id = %run_id,
        tool = %tool,
        duration_ms = duration_ms,
        success = success,
        error_kind = error_kind.map(|k| k.as_str()).unwrap_or("none"),
    );
}

/// Emit event: the remote session reported a fault (warning level).
pub fn emit_session_fault(
    run_id: &str,
    sandbox_id: &str,
    kind: ToolErrorKind,
    exit_code: Option<i32>,
    session_in_use: bool,
) {
    warn!(
        event = "session.fault",
        run_id = %run_id,
        sandbox_id = %sandbox_id,
        kind = kind.as_str(),
        exit_code = exit_code.unwrap_or(-1),
        session_in_use = session_in_use,
    );
}

/// Emit event: an anchored edit batch was rejected as stale.
pub fn emit_edit_hash_mismatch(run_id: &str, path: &str, stale_lines: usize) {
    warn!(
        event = "edit.hash_mismatch",
        run_id = %run_id,
        path = %path,
        stale_lines = stale_lines,
    );
}

/// Emit event: a sandbox record could not be marked as used after a command
/// ran there. The command's result is still returned.
pub fn emit_sandbox_touch_failed(run_id: &str, sandbox: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "sandbox.touch_failed",
        run_id = %run_id,
        sandbox = %sandbox,
        error = %error,
    );
}

/// Emit event: stdout or a response body was cut to its budget.
pub fn emit_output_truncated(run_id: &str, tool: &str, omitted_bytes: usize) {
    info!(
        event = "output.truncated",
        run_id = %run_id,
        tool = %tool,
        omitted_bytes = omitted_bytes,
    );
}

/// Emit event: a policy was pushed to the agent's home sandbox.
pub fn emit_policy_synced(agent_id: &str, attempts: u32) {
    info!(event = "policy.synced", agent_id = %agent_id, attempts = attempts);
}

/// Emit event: pushing a policy failed; it stays pending (warning level).
pub fn emit_policy_sync_failed(agent_id: &str, attempts: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "policy.sync_failed",
        agent_id = %agent_id,
        attempts = attempts,
        error = %error,
    );
}

/// Emit event: a credential-bearing request was attempted.
pub fn emit_credential_request(run_id: &str, alias: &str, host: &str, outcome: &str) {
    info!(
        event = "credential.request",
        run_id = %run_id,
        alias = %alias,
        host = %host,
        outcome = %outcome,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_span_enter_and_emitters_do_not_panic() {
        let span = ToolSpan::new("agent", "run", "exec");
        let _guard = span.enter();
        emit_tool_started("run", "agent", "exec", "vm-1");
        emit_tool_finished("run", "exec", 3, false, Some(ToolErrorKind::CommandFailed));
        emit_session_fault("run", "vm-1", ToolErrorKind::SessionError, None, true);
        emit_sandbox_touch_failed("run", "scratch", &"backend down");
    }
}
