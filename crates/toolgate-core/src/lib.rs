//! toolgate core library
//!
//! Turns an agent's structured tool call into a bounded, observable effect
//! on a remote sandbox: shell commands through a session driver, anchored
//! file edits, credential-bearing HTTP requests gated by a per-agent domain
//! policy. Everything returned to the agent is sanitized first.

pub mod anchor;
pub mod audit;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod fakes;
pub mod file_edit;
pub mod metrics;
pub mod network_policy;
pub mod obs;
pub mod result;
pub mod sandbox;
pub mod sanitize;
pub mod secure_http;
pub mod session;
pub mod skill_scan;
pub mod telemetry;
pub mod truncate;
pub mod vault;

pub use anchor::{line_hash, Anchor};
pub use audit::{AuditOutcome, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{ConfigError, EditMode, ToolgateConfig};
pub use context::{ExecutionContext, SessionHandle};
pub use dispatch::{Capabilities, ToolCall, ToolDispatcher};
pub use file_edit::FileEditTool;
pub use network_policy::{
    evaluate, is_valid_pattern, Decision, EnforcementRuleSet, PolicyDraft, PolicyService,
    PolicyValidator, ValidationReport,
};
pub use result::{ToolError, ToolErrorKind, ToolMeta, ToolResult};
pub use sandbox::{ExecOptions, ExecOutput, LocalShellSandbox, SandboxCapability, SandboxIoError};
pub use sanitize::{sanitize, BoundaryKind, Sanitizer};
pub use secure_http::{HttpTransport, ReqwestTransport, SecureHttpTool, SecureRequest};
pub use session::{ExecOverrides, SessionDriver};
pub use vault::VaultAdapter;

pub use toolgate_state::{
    Credential, CredentialSummary, NetworkPolicy, PolicyMode, PolicyRule, RuleAction, SandboxKind,
    SandboxRecord, Secret,
};
