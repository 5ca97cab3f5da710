//! The uniform result envelope and the error taxonomy behind it.
//!
//! Every tool returns a [`ToolResult`]; internal failures are [`ToolError`]s
//! that the dispatcher folds into `ToolResult { success: false, .. }`. The
//! `error` string the agent sees is the error's `Display`, always prefixed
//! with its [`ToolErrorKind`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolErrorKind {
    HashMismatch,
    CredentialNotAssigned,
    HostNotAllowed,
    DomainBlocked,
    LocationNotAllowed,
    NoPlaceholderFound,
    RequestTimedOut,
    RequestFailed,
    SessionError,
    SessionInvalidated,
    CommandFailed,
    PolicyValidationError,
    InvalidArguments,
    UnknownTool,
    EditNotApplied,
    SandboxUnavailable,
    StorageFailure,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HashMismatch => "HashMismatch",
            Self::CredentialNotAssigned => "CredentialNotAssigned",
            Self::HostNotAllowed => "HostNotAllowed",
            Self::DomainBlocked => "DomainBlocked",
            Self::LocationNotAllowed => "LocationNotAllowed",
            Self::NoPlaceholderFound => "NoPlaceholderFound",
            Self::RequestTimedOut => "RequestTimedOut",
            Self::RequestFailed => "RequestFailed",
            Self::SessionError => "SessionError",
            Self::SessionInvalidated => "SessionInvalidated",
            Self::CommandFailed => "CommandFailed",
            Self::PolicyValidationError => "PolicyValidationError",
            Self::InvalidArguments => "InvalidArguments",
            Self::UnknownTool => "UnknownTool",
            Self::EditNotApplied => "EditNotApplied",
            Self::SandboxUnavailable => "SandboxUnavailable",
            Self::StorageFailure => "StorageFailure",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stale anchor found while validating an edit batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMismatch {
    pub line: usize,
    pub expected: String,
    /// `None` when the line no longer exists.
    pub current: Option<String>,
}

fn describe_mismatches(path: &str, mismatches: &[LineMismatch], total_lines: &usize) -> String {
    let details: Vec<String> = mismatches
        .iter()
        .map(|m| match &m.current {
            Some(current) => format!(
                "line {} expected {} but is now {}",
                m.line, m.expected, current
            ),
            None => format!(
                "line {} no longer exists (file has {} lines)",
                m.line, total_lines
            ),
        })
        .collect();
    format!(
        "{path} changed since it was last read ({}); nothing was written, re-read the file to get fresh anchors",
        details.join("; ")
    )
}

/// Where a credential placeholder was found in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderLocation {
    Header,
    Query,
    Body,
    /// The URL path or host; never a permitted location.
    Url,
}

impl fmt::Display for PlaceholderLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => f.write_str("header"),
            Self::Query => f.write_str("query"),
            Self::Body => f.write_str("body"),
            Self::Url => f.write_str("url path"),
        }
    }
}

/// Failures raised inside tools. Messages are shown to the agent verbatim and
/// must never contain secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("HashMismatch: {}", describe_mismatches(.path, .mismatches, .total_lines))]
    HashMismatch {
        path: String,
        mismatches: Vec<LineMismatch>,
        total_lines: usize,
    },

    #[error("CredentialNotAssigned: credential '{alias}' {reason}")]
    CredentialNotAssigned { alias: String, reason: String },

    #[error("HostNotAllowed: host '{host}' is not in the allowed hosts for credential '{alias}' (allowed: {})", .allowed.join(", "))]
    HostNotAllowed {
        alias: String,
        host: String,
        allowed: Vec<String>,
    },

    #[error("DomainBlocked: network policy denies '{host}'{}", .rule.as_ref().map(|r| format!(" (rule '{r}')")).unwrap_or_default())]
    DomainBlocked { host: String, rule: Option<String> },

    #[error("LocationNotAllowed: placeholder {{{alias}}} found in the {location}, but credential '{alias}' may only be placed in: {permitted}")]
    LocationNotAllowed {
        alias: String,
        location: PlaceholderLocation,
        permitted: String,
    },

    #[error("NoPlaceholderFound: request does not contain the placeholder {{{alias}}} in any header, query parameter or body")]
    NoPlaceholderFound { alias: String },

    #[error("RequestTimedOut: request timed out after {timeout_ms}ms")]
    RequestTimedOut { timeout_ms: u64 },

    #[error("RequestFailed: {message}")]
    RequestFailed { message: String },

    #[error("SessionError: remote session is unusable{}: {detail}; recreate the session and retry", .exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    SessionError {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("SessionInvalidated: command timed out and the shell was reset (exit code {exit_code}): {detail}")]
    SessionInvalidated { exit_code: i32, detail: String },

    #[error("CommandFailed: command exited with code {exit_code}{}", if .detail.is_empty() { String::new() } else { format!(": {}", .detail) })]
    CommandFailed { exit_code: i32, detail: String },

    #[error("PolicyValidationError: {}", .errors.join("; "))]
    PolicyValidation { errors: Vec<String> },

    #[error("InvalidArguments: {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("UnknownTool: no tool named '{name}'")]
    UnknownTool { name: String },

    #[error("EditNotApplied: {path}: {reason}")]
    EditNotApplied { path: String, reason: String },

    #[error("SandboxUnavailable: {detail}")]
    SandboxUnavailable { detail: String },

    #[error("StorageFailure: {detail}")]
    Storage { detail: String },
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::HashMismatch { .. } => ToolErrorKind::HashMismatch,
            Self::CredentialNotAssigned { .. } => ToolErrorKind::CredentialNotAssigned,
            Self::HostNotAllowed { .. } => ToolErrorKind::HostNotAllowed,
            Self::DomainBlocked { .. } => ToolErrorKind::DomainBlocked,
            Self::LocationNotAllowed { .. } => ToolErrorKind::LocationNotAllowed,
            Self::NoPlaceholderFound { .. } => ToolErrorKind::NoPlaceholderFound,
            Self::RequestTimedOut { .. } => ToolErrorKind::RequestTimedOut,
            Self::RequestFailed { .. } => ToolErrorKind::RequestFailed,
            Self::SessionError { .. } => ToolErrorKind::SessionError,
            Self::SessionInvalidated { .. } => ToolErrorKind::SessionInvalidated,
            Self::CommandFailed { .. } => ToolErrorKind::CommandFailed,
            Self::PolicyValidation { .. } => ToolErrorKind::PolicyValidationError,
            Self::InvalidArguments { .. } => ToolErrorKind::InvalidArguments,
            Self::UnknownTool { .. } => ToolErrorKind::UnknownTool,
            Self::EditNotApplied { .. } => ToolErrorKind::EditNotApplied,
            Self::SandboxUnavailable { .. } => ToolErrorKind::SandboxUnavailable,
            Self::Storage { .. } => ToolErrorKind::StorageFailure,
        }
    }

    pub fn invalid_arguments(tool: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Meta flags implied by the error class alone.
    pub fn implied_meta(&self) -> ToolMeta {
        let mut meta = ToolMeta {
            error_kind: Some(self.kind()),
            ..ToolMeta::default()
        };
        match self {
            Self::HashMismatch { .. } => meta.hash_mismatch = true,
            Self::SessionError { exit_code, .. } => {
                meta.session_error = true;
                meta.exit_code = *exit_code;
            }
            Self::SessionInvalidated { exit_code, .. } => {
                meta.session_invalidated = true;
                meta.timed_out = true;
                meta.exit_code = Some(*exit_code);
            }
            Self::CommandFailed { exit_code, .. } => meta.exit_code = Some(*exit_code),
            Self::RequestTimedOut { .. } => meta.timed_out = true,
            Self::PolicyValidation { errors } => meta.policy_errors = errors.clone(),
            _ => {}
        }
        meta
    }
}

impl From<toolgate_state::StorageError> for ToolError {
    fn from(err: toolgate_state::StorageError) -> Self {
        ToolError::Storage {
            detail: err.to_string(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Structured side channel of a [`ToolResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub session_error: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub session_invalidated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hash_mismatch: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omitted_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_errors: Vec<String>,
    /// Tool-specific structured payload (e.g. credential listings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolMeta {
    /// Merge flags from `other`, keeping values already set on `self`.
    pub fn merge(mut self, other: ToolMeta) -> Self {
        self.error_kind = self.error_kind.or(other.error_kind);
        self.cwd = self.cwd.or(other.cwd);
        self.exit_code = self.exit_code.or(other.exit_code);
        self.duration_ms = self.duration_ms.or(other.duration_ms);
        self.session_error |= other.session_error;
        self.session_invalidated |= other.session_invalidated;
        self.timed_out |= other.timed_out;
        self.hash_mismatch |= other.hash_mismatch;
        self.truncated |= other.truncated;
        self.omitted_bytes = self.omitted_bytes.or(other.omitted_bytes);
        self.http_status = self.http_status.or(other.http_status);
        self.http_ok = self.http_ok.or(other.http_ok);
        if self.policy_errors.is_empty() {
            self.policy_errors = other.policy_errors;
        }
        self.data = self.data.or(other.data);
        self
    }
}

/// The envelope every tool call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub meta: ToolMeta,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            meta: ToolMeta::default(),
        }
    }

    pub fn ok_with_meta(output: impl Into<String>, meta: ToolMeta) -> Self {
        Self {
            meta,
            ..Self::ok(output)
        }
    }

    /// Failure envelope with the error's implied flags plus `meta`.
    pub fn failure(error: ToolError, output: impl Into<String>, meta: ToolMeta) -> Self {
        let meta = meta.merge(error.implied_meta());
        Self {
            success: false,
            output: output.into(),
            error: Some(error.to_string()),
            meta,
        }
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.meta.error_kind
    }
}

impl From<ToolError> for ToolResult {
    fn from(error: ToolError) -> Self {
        ToolResult::failure(error, String::new(), ToolMeta::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_strings_are_prefixed_with_kind() {
        let err = ToolError::HostNotAllowed {
            alias: "gh".into(),
            host: "evil.example".into(),
            allowed: vec!["api.github.com".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("HostNotAllowed:"));
        assert!(msg.contains("evil.example"));
        assert_eq!(err.kind(), ToolErrorKind::HostNotAllowed);
    }

    #[test]
    fn command_failed_always_mentions_exit_code() {
        let err = ToolError::CommandFailed {
            exit_code: 2,
            detail: String::new(),
        };
        assert_eq!(err.to_string(), "CommandFailed: command exited with code 2");
    }

    #[test]
    fn placeholder_messages_render_braces() {
        let err = ToolError::NoPlaceholderFound { alias: "stripe".into() };
        assert!(err.to_string().contains("{stripe}"));
    }

    #[test]
    fn hash_mismatch_names_lines_and_hashes() {
        let err = ToolError::HashMismatch {
            path: "/src/main.rs".into(),
            mismatches: vec![
                LineMismatch {
                    line: 3,
                    expected: "aaaaaa".into(),
                    current: Some("bbbbbb".into()),
                },
                LineMismatch {
                    line: 9,
                    expected: "cccccc".into(),
                    current: None,
                },
            ],
            total_lines: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3 expected aaaaaa but is now bbbbbb"));
        assert!(msg.contains("line 9 no longer exists (file has 5 lines)"));
    }

    #[test]
    fn failure_envelope_carries_flags() {
        let result = ToolResult::failure(
            ToolError::SessionError {
                exit_code: Some(1),
                detail: "Session is closed".into(),
            },
            "",
            ToolMeta::default(),
        );
        assert!(!result.success);
        assert!(result.meta.session_error);
        assert_eq!(result.meta.exit_code, Some(1));
        assert_eq!(result.error_kind(), Some(ToolErrorKind::SessionError));
    }

    #[test]
    fn meta_serializes_camel_case_and_skips_defaults() {
        let meta = ToolMeta {
            session_invalidated: true,
            cwd: Some("/work".into()),
            ..ToolMeta::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["sessionInvalidated"], true);
        assert_eq!(value["cwd"], "/work");
        assert!(value.get("hashMismatch").is_none());
    }
}
