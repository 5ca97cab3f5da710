//! `list_credentials` and `secure_http_request`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use toolgate_state::Credential;
use tracing::{debug, instrument};
use url::Url;

use super::placement::{interpolate, locate, RequestParts};
use super::redact::Redactor;
use super::transport::{HttpTransport, InboundResponse, OutboundRequest, TransportError};
use crate::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::config::HttpConfig;
use crate::context::ExecutionContext;
use crate::metrics::METRICS;
use crate::network_policy::{normalize_host, PolicyService};
use crate::obs;
use crate::result::{ToolError, ToolErrorKind, ToolMeta, ToolResult};
use crate::truncate::truncate_utf8;
use crate::vault::{permits, permitted_locations, placeholder, VaultAdapter};

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Arguments of `secure_http_request`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecureRequest {
    pub alias: String,
    pub url: String,
    #[serde(default = "SecureRequest::default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl SecureRequest {
    fn default_method() -> String {
        "GET".to_string()
    }

    fn parts(&self) -> RequestParts<'_> {
        RequestParts {
            url: &self.url,
            headers: &self.headers,
            query: &self.query,
            body: self.body.as_deref(),
        }
    }
}

struct Sent {
    response: InboundResponse,
    redactor: Redactor,
}

pub struct SecureHttpTool {
    vault: VaultAdapter,
    policy: Arc<PolicyService>,
    transport: Arc<dyn HttpTransport>,
    audit: Arc<dyn AuditSink>,
    config: HttpConfig,
}

impl SecureHttpTool {
    pub fn new(
        vault: VaultAdapter,
        policy: Arc<PolicyService>,
        transport: Arc<dyn HttpTransport>,
        audit: Arc<dyn AuditSink>,
        config: HttpConfig,
    ) -> Self {
        Self {
            vault,
            policy,
            transport,
            audit,
            config,
        }
    }

    pub async fn list_credentials(&self, ctx: &ExecutionContext) -> Result<ToolResult, ToolError> {
        let listings = self.vault.list_for_agent(&ctx.agent_id).await?;
        if listings.is_empty() {
            return Ok(ToolResult::ok("No credentials are assigned to this agent."));
        }
        let mut text = String::from(
            "Credentials (write the placeholder where the secret belongs; it is substituted when the request is sent):\n",
        );
        for listing in &listings {
            text.push_str(&listing.render());
            text.push('\n');
        }
        let meta = ToolMeta {
            data: serde_json::to_value(&listings).ok(),
            ..ToolMeta::default()
        };
        Ok(ToolResult::ok_with_meta(text, meta))
    }

    /// Send one credential-bearing request. Every attempt is audited.
    #[instrument(skip(self, ctx, request), fields(run_id = %ctx.run_id, alias = %request.alias, method = %request.method))]
    pub async fn request(&self, ctx: &ExecutionContext, request: &SecureRequest) -> ToolResult {
        METRICS.inc_credential_requests();
        let method = request.method.to_ascii_uppercase();
        let host = Url::parse(&request.url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
            .unwrap_or_default();

        let attempt = self.attempt(ctx, request, &method, &host).await;
        let (outcome, status) = match &attempt {
            Ok(sent) => (AuditOutcome::Sent, Some(sent.response.status)),
            Err(err) => match err.kind() {
                kind @ (ToolErrorKind::RequestTimedOut | ToolErrorKind::RequestFailed) => {
                    (AuditOutcome::Failed(kind), None)
                }
                kind => (AuditOutcome::Rejected(kind), None),
            },
        };
        self.audit
            .record(AuditRecord {
                agent_id: ctx.agent_id.clone(),
                run_id: ctx.run_id.clone(),
                alias: request.alias.clone(),
                host,
                method: method.clone(),
                outcome,
                status,
                at: Utc::now(),
            })
            .await;

        match attempt {
            Ok(sent) => self.render(ctx, &method, request, sent),
            Err(err) => err.into(),
        }
    }

    async fn attempt(
        &self,
        ctx: &ExecutionContext,
        request: &SecureRequest,
        method: &str,
        host: &str,
    ) -> Result<Sent, ToolError> {
        let credential = self.vault.resolve(&ctx.agent_id, &request.alias).await?;

        let url = Url::parse(&request.url).map_err(|e| {
            ToolError::invalid_arguments("secure_http_request", format!("invalid url: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::invalid_arguments(
                "secure_http_request",
                format!("unsupported url scheme '{}'", url.scheme()),
            ));
        }
        if !METHODS.contains(&method) {
            return Err(ToolError::invalid_arguments(
                "secure_http_request",
                format!("unsupported method '{method}'"),
            ));
        }

        if !host_allowed(&credential, host) {
            return Err(ToolError::HostNotAllowed {
                alias: credential.alias.clone(),
                host: host.to_string(),
                allowed: credential.allowed_hosts.clone(),
            });
        }

        let decision = self.policy.check_domain(&ctx.agent_id, host).await?;
        if !decision.is_allowed() {
            return Err(ToolError::DomainBlocked {
                host: host.to_string(),
                rule: decision.matched_rule.map(|r| r.domain),
            });
        }

        let token = placeholder(&credential.alias);
        let parts = request.parts();
        let found = locate(&parts, &token);
        if found.is_empty() {
            return Err(ToolError::NoPlaceholderFound {
                alias: credential.alias.clone(),
            });
        }
        if let Some(location) = found.into_iter().find(|loc| !permits(&credential, *loc)) {
            return Err(ToolError::LocationNotAllowed {
                alias: credential.alias.clone(),
                location,
                permitted: permitted_locations(&credential),
            });
        }

        let secret = credential.secret.expose();
        let redactor = Redactor::new(secret);
        let prepared = interpolate(&parts, &token, secret).map_err(|e| {
            ToolError::invalid_arguments("secure_http_request", format!("invalid url: {e}"))
        })?;

        let timeout_ms = self.config.timeout_ms;
        let outbound = OutboundRequest {
            method: method.to_string(),
            url: prepared.url,
            headers: prepared.headers,
            body: prepared.body,
            timeout: Duration::from_millis(timeout_ms),
        };
        debug!(host, "sending credential-bearing request");

        let answered = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.transport.send(outbound),
        )
        .await;
        match answered {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                Err(ToolError::RequestTimedOut { timeout_ms })
            }
            Ok(Err(err)) => Err(ToolError::RequestFailed {
                message: redactor.redact(&err.to_string()),
            }),
            Ok(Ok(response)) => Ok(Sent { response, redactor }),
        }
    }

    fn render(
        &self,
        ctx: &ExecutionContext,
        method: &str,
        request: &SecureRequest,
        sent: Sent,
    ) -> ToolResult {
        let Sent { response, redactor } = sent;
        let body = redactor.redact(&response.body);
        let kept = truncate_utf8(&body, self.config.max_response_bytes);

        let mut text = format!(
            "{method} {} -> HTTP {}\n\n{}",
            redactor.redact(&request.url),
            response.status,
            kept.kept
        );
        if kept.was_truncated() {
            text.push_str(&format!(
                "\n[response body truncated: omitted {} bytes]",
                kept.omitted_bytes
            ));
            obs::emit_output_truncated(&ctx.run_id, "secure_http_request", kept.omitted_bytes);
            METRICS.inc_truncations();
        }

        let meta = ToolMeta {
            http_status: Some(response.status),
            http_ok: Some((200..300).contains(&response.status)),
            truncated: kept.was_truncated(),
            omitted_bytes: kept.was_truncated().then_some(kept.omitted_bytes),
            ..ToolMeta::default()
        };
        ToolResult::ok_with_meta(text, meta)
    }
}

fn host_allowed(credential: &Credential, host: &str) -> bool {
    !host.is_empty()
        && credential
            .allowed_hosts
            .iter()
            .any(|allowed| normalize_host(allowed) == host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::PolicyConfig;
    use crate::fakes::{RecordingSyncer, ScriptedTransport, TransportScript};
    use crate::network_policy::{PolicyDraft, RuleDraft};
    use crate::result::PlaceholderLocation;
    use toolgate_state::fakes::{MemoryCredentialVault, MemoryPolicyStore, MemorySandboxDirectory};
    use toolgate_state::{SandboxRecord, SandboxDirectory, Secret};

    const SECRET: &str = "ghp_Zx9 secret/value";

    struct Harness {
        tool: SecureHttpTool,
        transport: Arc<ScriptedTransport>,
        audit: Arc<MemoryAuditSink>,
        policy: Arc<PolicyService>,
    }

    fn github(header: bool, query: bool, body: bool) -> Credential {
        Credential {
            alias: "github".into(),
            provider: "github".into(),
            allowed_hosts: vec!["api.github.com".into()],
            allowed_in_header: header,
            allowed_in_query: query,
            allowed_in_body: body,
            enabled: true,
            secret: Secret::new(SECRET),
        }
    }

    async fn harness(credential: Credential, config: HttpConfig) -> Harness {
        let vault = MemoryCredentialVault::new();
        vault.assign("agent", credential).unwrap();
        let sandboxes = Arc::new(MemorySandboxDirectory::new());
        sandboxes
            .upsert_sandbox("agent", SandboxRecord::home("home", "vm-home"))
            .await
            .unwrap();
        let policy = Arc::new(PolicyService::new(
            Arc::new(MemoryPolicyStore::new()),
            sandboxes,
            Arc::new(RecordingSyncer::new()),
            &PolicyConfig::default(),
        ));
        let transport = Arc::new(ScriptedTransport::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let tool = SecureHttpTool::new(
            VaultAdapter::new(Arc::new(vault)),
            policy.clone(),
            transport.clone(),
            audit.clone(),
            config,
        );
        Harness {
            tool,
            transport,
            audit,
            policy,
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("agent", "run-1", "vm-home", "/home/user")
    }

    fn request(url: &str) -> SecureRequest {
        SecureRequest {
            alias: "github".into(),
            url: url.into(),
            method: "get".into(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    fn with_auth_header(mut req: SecureRequest) -> SecureRequest {
        req.headers
            .insert("Authorization".into(), "Bearer {github}".into());
        req
    }

    #[tokio::test]
    async fn successful_request_interpolates_and_redacts() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        h.transport.push(TransportScript::respond(
            200,
            &format!("{{\"echo\": \"Bearer {SECRET}\"}}"),
        ));

        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://API.github.com/user")))
            .await;

        assert!(result.success, "{:?}", result.error);
        assert!(!result.output.contains(SECRET));
        assert!(result.output.contains("[REDACTED_SECRET]"));
        assert_eq!(result.meta.http_status, Some(200));
        assert_eq!(result.meta.http_ok, Some(true));

        let sent = h.transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].headers[0].1, format!("Bearer {SECRET}"));

        let audit = h.audit.records();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].outcome, AuditOutcome::Sent);
        assert_eq!(audit[0].host, "api.github.com");
        assert_eq!(audit[0].status, Some(200));
    }

    #[tokio::test]
    async fn non_2xx_is_transport_success_with_http_ok_false() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        h.transport.push(TransportScript::respond(404, "not found"));
        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/nope")))
            .await;
        assert!(result.success);
        assert_eq!(result.meta.http_ok, Some(false));
        assert_eq!(result.meta.http_status, Some(404));
    }

    #[tokio::test]
    async fn header_only_credential_rejects_query_placeholder() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        let result = h
            .tool
            .request(&ctx(), &request("https://api.github.com/user?access_token={github}"))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::LocationNotAllowed));
        let error = result.error.unwrap();
        assert!(error.contains("query"));
        assert!(h.transport.requests().is_empty());
        assert_eq!(
            h.audit.records()[0].outcome,
            AuditOutcome::Rejected(ToolErrorKind::LocationNotAllowed)
        );
    }

    #[tokio::test]
    async fn placeholder_in_path_is_never_allowed() {
        let h = harness(github(true, true, true), HttpConfig::default()).await;
        let result = h
            .tool
            .request(&ctx(), &request("https://api.github.com/{github}/repos"))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::LocationNotAllowed));
        assert!(result.error.unwrap().contains(&PlaceholderLocation::Url.to_string()));
    }

    #[tokio::test]
    async fn query_placeholder_uses_encoded_secret() {
        let h = harness(github(false, true, false), HttpConfig::default()).await;
        h.transport.push(TransportScript::respond(200, "ok"));
        let result = h
            .tool
            .request(&ctx(), &request("https://api.github.com/user?token={github}"))
            .await;
        assert!(result.success, "{:?}", result.error);
        let url = h.transport.requests()[0].url.clone();
        assert_eq!(url.query(), Some("token=ghp_Zx9+secret%2Fvalue"));
        assert!(!result.output.contains("ghp_Zx9"));
    }

    #[tokio::test]
    async fn missing_placeholder_and_wrong_host() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        let none = h.tool.request(&ctx(), &request("https://api.github.com/user")).await;
        assert_eq!(none.error_kind(), Some(ToolErrorKind::NoPlaceholderFound));

        let wrong_host = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://evil.example/steal")))
            .await;
        assert_eq!(wrong_host.error_kind(), Some(ToolErrorKind::HostNotAllowed));
        assert!(h.transport.requests().is_empty());
        assert_eq!(h.audit.records().len(), 2);
    }

    #[tokio::test]
    async fn unknown_alias_is_not_assigned() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        let mut req = with_auth_header(request("https://api.github.com/user"));
        req.alias = "stripe".into();
        let result = h.tool.request(&ctx(), &req).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::CredentialNotAssigned));
        assert_eq!(h.audit.records()[0].alias, "stripe");
    }

    #[tokio::test]
    async fn network_policy_blocks_allowed_host() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        let draft = PolicyDraft {
            mode: "deny-list".into(),
            rules: vec![
                RuleDraft {
                    domain: "*.github.com".into(),
                    action: "deny".into(),
                },
                RuleDraft {
                    domain: "*".into(),
                    action: "allow".into(),
                },
            ],
            preset_id: None,
        };
        h.policy.replace_policy("agent", &draft).await.unwrap();

        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/user")))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::DomainBlocked));
        assert!(result.error.unwrap().contains("*.github.com"));
        assert!(h.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_timeout_has_deterministic_message() {
        let config = HttpConfig {
            timeout_ms: 2_500,
            ..HttpConfig::default()
        };
        let h = harness(github(true, false, false), config).await;
        h.transport.push(TransportScript::Fail(TransportError::Timeout));
        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/user")))
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("RequestTimedOut: request timed out after 2500ms")
        );
        assert!(result.meta.timed_out);
        assert_eq!(
            h.audit.records()[0].outcome,
            AuditOutcome::Failed(ToolErrorKind::RequestTimedOut)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transport_hits_local_deadline() {
        let config = HttpConfig {
            timeout_ms: 1_000,
            ..HttpConfig::default()
        };
        let h = harness(github(true, false, false), config).await;
        h.transport.push(TransportScript::Hang);
        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/user")))
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("RequestTimedOut: request timed out after 1000ms")
        );
    }

    #[tokio::test]
    async fn transport_error_text_is_redacted() {
        let h = harness(github(true, false, false), HttpConfig::default()).await;
        h.transport.push(TransportScript::Fail(TransportError::Connect(format!(
            "refused while sending {SECRET}"
        ))));
        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/user")))
            .await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::RequestFailed));
        assert!(!result.error.unwrap().contains(SECRET));
    }

    #[tokio::test]
    async fn large_body_is_truncated() {
        let config = HttpConfig {
            max_response_bytes: 10,
            ..HttpConfig::default()
        };
        let h = harness(github(true, false, false), config).await;
        h.transport.push(TransportScript::respond(200, &"y".repeat(50)));
        let result = h
            .tool
            .request(&ctx(), &with_auth_header(request("https://api.github.com/user")))
            .await;
        assert!(result.meta.truncated);
        assert_eq!(result.meta.omitted_bytes, Some(40));
        assert!(result
            .output
            .ends_with("[response body truncated: omitted 40 bytes]"));
    }

    #[tokio::test]
    async fn listing_shows_placeholder() {
        let h = harness(github(true, false, true), HttpConfig::default()).await;
        let result = h.tool.list_credentials(&ctx()).await.unwrap();
        assert!(result.output.contains("{github}"));
        assert!(!result.output.contains(SECRET));
        assert!(result.meta.data.is_some());
    }
}
