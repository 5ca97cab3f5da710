//! Tool dispatcher: the single entry point for agent tool calls.
//!
//! `dispatch(name, arguments, ctx)` parses the arguments into a
//! [`ToolCall`], routes it, sanitizes whatever comes back and always returns
//! a [`ToolResult`]; no failure escapes as anything else.

pub mod call;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use toolgate_state::{CredentialVault, PolicyStore, SandboxDirectory, SandboxKind};
use tracing::Instrument;

pub use self::call::ToolCall;
use self::call::{CheckDomainArgs, DiscoverSkillsArgs, EditFileArgs, ExecArgs};
use crate::audit::AuditSink;
use crate::config::{EditMode, ToolgateConfig};
use crate::context::ExecutionContext;
use crate::file_edit::anchored::AnchorEdit;
use crate::file_edit::plain::PlainEdit;
use crate::file_edit::FileEditTool;
use crate::metrics::METRICS;
use crate::network_policy::{PolicyService, PolicySyncer, SandboxFileSyncer};
use crate::obs::{self, ToolSpan};
use crate::result::{ToolError, ToolMeta, ToolResult};
use crate::sandbox::SandboxCapability;
use crate::sanitize::{BoundaryKind, Sanitizer};
use crate::secure_http::{HttpTransport, SecureHttpTool};
use crate::session::{ExecOverrides, SessionDriver};
use crate::skill_scan::{build_scan_script, parse_scan_output, DEFAULT_SKILL_ROOTS};
use crate::vault::VaultAdapter;

/// External capabilities the dispatcher is built on.
#[derive(Clone)]
pub struct Capabilities {
    pub sandbox: Arc<dyn SandboxCapability>,
    pub vault: Arc<dyn CredentialVault>,
    pub policy_store: Arc<dyn PolicyStore>,
    pub sandboxes: Arc<dyn SandboxDirectory>,
    pub transport: Arc<dyn HttpTransport>,
    pub audit: Arc<dyn AuditSink>,
    /// Defaults to writing the rule set into the home sandbox.
    pub syncer: Option<Arc<dyn PolicySyncer>>,
}

pub struct ToolDispatcher {
    session: SessionDriver,
    files: FileEditTool,
    http: SecureHttpTool,
    policy: Arc<PolicyService>,
    sandboxes: Arc<dyn SandboxDirectory>,
    sanitizer: Sanitizer,
}

impl ToolDispatcher {
    pub fn new(config: &ToolgateConfig, caps: Capabilities) -> Self {
        let syncer = caps.syncer.unwrap_or_else(|| {
            Arc::new(SandboxFileSyncer::new(
                caps.sandbox.clone(),
                config.policy.enforcement_path.clone(),
            ))
        });
        let policy = Arc::new(PolicyService::new(
            caps.policy_store,
            caps.sandboxes.clone(),
            syncer,
            &config.policy,
        ));
        Self {
            session: SessionDriver::new(caps.sandbox.clone(), config.session.clone()),
            files: FileEditTool::new(caps.sandbox, config.edit.clone()),
            http: SecureHttpTool::new(
                VaultAdapter::new(caps.vault),
                policy.clone(),
                caps.transport,
                caps.audit,
                config.http.clone(),
            ),
            policy,
            sandboxes: caps.sandboxes,
            sanitizer: Sanitizer::new(&config.sanitize),
        }
    }

    /// Policy workflow (replace, presets, retries) for admin callers.
    pub fn policy(&self) -> &Arc<PolicyService> {
        &self.policy
    }

    /// Run tool `name` with raw JSON `arguments`.
    pub async fn dispatch(&self, name: &str, arguments: Value, ctx: &ExecutionContext) -> ToolResult {
        let span = ToolSpan::new(&ctx.agent_id, &ctx.run_id, name);
        async {
            let started = Instant::now();
            METRICS.inc_tool_calls();
            obs::emit_tool_started(&ctx.run_id, &ctx.agent_id, name, &ctx.sandbox_id);

            let raw = match ToolCall::parse(name, arguments) {
                Ok(call) => self
                    .route(&call, ctx)
                    .await
                    .map(|(r, machine)| (r, Some(call), machine)),
                Err(err) => Err(err),
            };
            let result = match raw {
                Ok((result, call, machine)) => self.finish(result, call.as_ref(), machine, ctx),
                Err(err) => self.finish(err.into(), None, None, ctx),
            };

            if !result.success {
                METRICS.inc_tool_failures();
            }
            obs::emit_tool_finished(
                &ctx.run_id,
                name,
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                result.success,
                result.error_kind(),
            );
            result
        }
        .instrument(span.span())
        .await
    }

    /// Run the call. Exec also reports the machine the command ran on.
    async fn route(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<(ToolResult, Option<String>), ToolError> {
        let result = match call {
            ToolCall::Exec(args) => {
                let (result, machine) = self.exec(args, ctx).await?;
                return Ok((result, Some(machine)));
            }
            ToolCall::ReadFile(args) => {
                self.files
                    .read_file(ctx, &args.path, args.offset, args.limit)
                    .await
            }
            ToolCall::WriteFile(args) => self.files.write_file(ctx, &args.path, &args.content).await,
            ToolCall::EditFile(args) => self.edit(args, ctx).await,
            ToolCall::ListCredentials(_) => self.http.list_credentials(ctx).await,
            ToolCall::SecureHttpRequest(req) => Ok(self.http.request(ctx, req).await),
            ToolCall::CheckDomain(args) => self.check_domain(args, ctx).await,
            ToolCall::ListSandboxes(_) => self.list_sandboxes(ctx).await,
            ToolCall::DiscoverSkills(args) => self.discover_skills(args, ctx).await,
        }?;
        Ok((result, None))
    }

    async fn exec(
        &self,
        args: &ExecArgs,
        ctx: &ExecutionContext,
    ) -> Result<(ToolResult, String), ToolError> {
        let mut overrides = ExecOverrides {
            cwd: args.cwd.clone(),
            timeout_ms: args.timeout_ms,
            ..ExecOverrides::default()
        };

        let Some(name) = &args.sandbox else {
            let result = self.session.execute(ctx, &args.command, &overrides).await;
            return Ok((result, ctx.sandbox_id.clone()));
        };
        let record = self
            .sandboxes
            .get_sandbox(&ctx.agent_id, name)
            .await?
            .ok_or_else(|| ToolError::invalid_arguments("exec", format!("no sandbox named '{name}'")))?;
        // The caller's session lives in its current sandbox only.
        overrides.one_shot =
            record.kind == SandboxKind::Ephemeral || record.machine_id != ctx.sandbox_id;
        overrides.sandbox_id = Some(record.machine_id.clone());
        let result = self.session.execute(ctx, &args.command, &overrides).await;
        if let Err(err) = self
            .sandboxes
            .touch_sandbox(&ctx.agent_id, &record.name, Utc::now())
            .await
        {
            obs::emit_sandbox_touch_failed(&ctx.run_id, &record.name, &err);
        }
        Ok((result, record.machine_id))
    }

    async fn edit(&self, args: &EditFileArgs, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let edits = Value::Array(args.edits.clone());
        match self.files.mode(ctx) {
            EditMode::Anchor => {
                let edits: Vec<AnchorEdit> = serde_json::from_value(edits).map_err(|e| {
                    ToolError::invalid_arguments(
                        "edit_file",
                        format!("anchor edits need {{line, hash, newContent}}: {e}"),
                    )
                })?;
                self.files.edit_anchored(ctx, &args.path, &edits).await
            }
            EditMode::Plain => {
                let edits: Vec<PlainEdit> = serde_json::from_value(edits).map_err(|e| {
                    ToolError::invalid_arguments(
                        "edit_file",
                        format!("plain edits need {{oldString, newString, replaceAll?}}: {e}"),
                    )
                })?;
                self.files.edit_plain(ctx, &args.path, &edits).await
            }
        }
    }

    async fn check_domain(&self, args: &CheckDomainArgs, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let decision = self.policy.check_domain(&ctx.agent_id, &args.host()).await?;
        let meta = ToolMeta {
            data: serde_json::to_value(&decision).ok(),
            ..ToolMeta::default()
        };
        Ok(ToolResult::ok_with_meta(decision.describe(), meta))
    }

    async fn list_sandboxes(&self, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let records = self.sandboxes.list_sandboxes(&ctx.agent_id).await?;
        if records.is_empty() {
            return Ok(ToolResult::ok("No sandboxes are registered for this agent."));
        }
        let now = Utc::now();
        let mut text = String::new();
        for record in &records {
            text.push_str(&format!(
                "- {} ({}){}{}\n",
                record.name,
                record.kind,
                if record.machine_id == ctx.sandbox_id { ", current" } else { "" },
                if record.is_stale(now) { ", stale" } else { "" },
            ));
        }
        let meta = ToolMeta {
            data: serde_json::to_value(&records).ok(),
            ..ToolMeta::default()
        };
        Ok(ToolResult::ok_with_meta(text, meta))
    }

    async fn discover_skills(
        &self,
        args: &DiscoverSkillsArgs,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let mut roots: Vec<String> = DEFAULT_SKILL_ROOTS.iter().map(|r| (*r).to_string()).collect();
        roots.push(format!("{}/.skills", ctx.cwd.trim_end_matches('/')));
        roots.extend(args.roots.iter().cloned());

        let script = build_scan_script(&roots);
        let run = self
            .session
            .execute(
                ctx,
                &script,
                &ExecOverrides {
                    one_shot: true,
                    ..ExecOverrides::default()
                },
            )
            .await;
        let report = parse_scan_output(&run.output);
        if !run.success && !report.complete {
            return Ok(run);
        }
        let mut text = String::new();
        if report.skills.is_empty() {
            text.push_str("No skills found.\n");
        }
        for skill in &report.skills {
            let label = self.sanitizer.sanitize_label(&skill.name, "skill");
            let active = if ctx.skills.contains(&skill.name) { " [active]" } else { "" };
            text.push_str(&format!("- {label}{active}: {}", skill.path));
            if let Some(description) = &skill.description {
                text.push_str(&format!(" ({})", self.sanitizer.sanitize_label(description, "")));
            }
            text.push('\n');
        }
        if !report.complete {
            text.push_str("[scan output incomplete; some skills may be missing]\n");
        }
        for problem in &report.problems {
            text.push_str(&format!("[skipped: {problem}]\n"));
        }
        let meta = ToolMeta {
            data: serde_json::to_value(&report).ok(),
            ..ToolMeta::default()
        };
        Ok(ToolResult::ok_with_meta(text, meta))
    }

    /// Sanitize output and error text, fencing content that came from
    /// outside the process.
    fn finish(
        &self,
        mut result: ToolResult,
        call: Option<&ToolCall>,
        machine: Option<String>,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let boundary = call.and_then(|c| match c {
            ToolCall::Exec(_) => Some((
                BoundaryKind::ToolOutput,
                machine.unwrap_or_else(|| ctx.sandbox_id.clone()),
            )),
            ToolCall::ReadFile(args) => Some((BoundaryKind::FileContent, args.path.clone())),
            ToolCall::SecureHttpRequest(req) => {
                Some((BoundaryKind::FetchedContent, fetched_source(&req.url, &req.alias)))
            }
            _ => None,
        });
        result.output = match boundary {
            Some((kind, source)) if !result.output.is_empty() => {
                self.sanitizer
                    .wrap_boundary(kind, &result.output, &[("source", source.as_str())])
            }
            _ => self.sanitizer.sanitize(&result.output),
        };
        result.error = result.error.map(|e| self.sanitizer.sanitize(&e));
        result
    }
}

/// Provenance for fetched content: the request URL without credentials,
/// query or fragment. Falls back to the alias when the URL does not parse.
fn fetched_source(url: &str, alias: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            // Only fails for URLs that cannot carry credentials.
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Err(_) => alias.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetched_source_drops_query_and_credentials() {
        assert_eq!(
            fetched_source("https://u:p@api.github.com/user?token={github}#x", "github"),
            "https://api.github.com/user"
        );
        assert_eq!(fetched_source("not a url", "github"), "github");
    }
}
