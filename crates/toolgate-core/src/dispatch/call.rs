//! Typed tool arguments.
//!
//! Raw JSON arguments are deserialized into [`ToolCall`] (unknown fields are
//! rejected) and then field-validated before any tool runs.

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::result::ToolError;
use crate::secure_http::SecureRequest;

/// Longest per-call timeout an agent may ask for.
pub const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;

pub const TOOL_NAMES: [&str; 9] = [
    "exec",
    "read_file",
    "write_file",
    "edit_file",
    "list_credentials",
    "secure_http_request",
    "check_domain",
    "list_sandboxes",
    "discover_skills",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecArgs {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Name of an ephemeral sandbox to run in instead of the home sandbox.
    #[serde(default)]
    pub sandbox: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadFileArgs {
    pub path: String,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
}

/// Edits stay untyped until the edit mode is known.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditFileArgs {
    pub path: String,
    pub edits: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckDomainArgs {
    /// Bare host or full URL.
    pub host: String,
}

impl CheckDomainArgs {
    pub fn host(&self) -> String {
        let raw = self.host.trim();
        if raw.contains("://") {
            if let Some(host) = Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_string)) {
                return host;
            }
        }
        raw.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiscoverSkillsArgs {
    /// Extra roots to scan.
    #[serde(default)]
    pub roots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    Exec(ExecArgs),
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    EditFile(EditFileArgs),
    ListCredentials(NoArgs),
    SecureHttpRequest(SecureRequest),
    CheckDomain(CheckDomainArgs),
    ListSandboxes(NoArgs),
    DiscoverSkills(DiscoverSkillsArgs),
}

fn require(tool: &str, field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::invalid_arguments(tool, format!("{field} must not be empty")));
    }
    if value.contains('\0') {
        return Err(ToolError::invalid_arguments(tool, format!("{field} contains a NUL byte")));
    }
    Ok(())
}

impl ToolCall {
    /// Deserialize and validate `arguments` for tool `name`.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(ToolError::UnknownTool {
                name: name.to_string(),
            });
        }
        let arguments = match arguments {
            Value::Null => json!({}),
            obj @ Value::Object(_) => obj,
            other => {
                return Err(ToolError::invalid_arguments(
                    name,
                    format!("arguments must be a JSON object, got {}", type_name(&other)),
                ))
            }
        };
        let call: ToolCall = serde_json::from_value(json!({ "tool": name, "args": arguments }))
            .map_err(|e| ToolError::invalid_arguments(name, e.to_string()))?;
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Exec(_) => "exec",
            Self::ReadFile(_) => "read_file",
            Self::WriteFile(_) => "write_file",
            Self::EditFile(_) => "edit_file",
            Self::ListCredentials(_) => "list_credentials",
            Self::SecureHttpRequest(_) => "secure_http_request",
            Self::CheckDomain(_) => "check_domain",
            Self::ListSandboxes(_) => "list_sandboxes",
            Self::DiscoverSkills(_) => "discover_skills",
        }
    }

    /// Field-level checks serde cannot express.
    pub fn validate(&self) -> Result<(), ToolError> {
        let tool = self.name();
        match self {
            Self::Exec(args) => {
                require(tool, "command", &args.command)?;
                if let Some(cwd) = &args.cwd {
                    require(tool, "cwd", cwd)?;
                }
                if let Some(sandbox) = &args.sandbox {
                    require(tool, "sandbox", sandbox)?;
                }
                match args.timeout_ms {
                    Some(0) => Err(ToolError::invalid_arguments(tool, "timeoutMs must be positive")),
                    Some(ms) if ms > MAX_TIMEOUT_MS => Err(ToolError::invalid_arguments(
                        tool,
                        format!("timeoutMs must be at most {MAX_TIMEOUT_MS}"),
                    )),
                    _ => Ok(()),
                }
            }
            Self::ReadFile(args) => {
                require(tool, "path", &args.path)?;
                if args.offset == Some(0) {
                    return Err(ToolError::invalid_arguments(tool, "offset is 1-based"));
                }
                if args.limit == Some(0) {
                    return Err(ToolError::invalid_arguments(tool, "limit must be positive"));
                }
                Ok(())
            }
            Self::WriteFile(args) => require(tool, "path", &args.path),
            Self::EditFile(args) => {
                require(tool, "path", &args.path)?;
                if args.edits.is_empty() {
                    return Err(ToolError::invalid_arguments(tool, "edits must not be empty"));
                }
                Ok(())
            }
            Self::SecureHttpRequest(args) => {
                require(tool, "alias", &args.alias)?;
                require(tool, "url", &args.url)
            }
            Self::CheckDomain(args) => require(tool, "host", &args.host),
            Self::DiscoverSkills(args) => {
                for root in &args.roots {
                    if !root.starts_with('/') || root.split('/').any(|s| s == "..") {
                        return Err(ToolError::invalid_arguments(
                            tool,
                            format!("root '{root}' must be an absolute path without '..'"),
                        ));
                    }
                }
                Ok(())
            }
            Self::ListCredentials(_) | Self::ListSandboxes(_) => Ok(()),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ToolErrorKind;

    #[test]
    fn parses_exec_with_optional_fields() {
        let call = ToolCall::parse(
            "exec",
            json!({"command": "ls -la", "timeoutMs": 5000, "sandbox": "scratch"}),
        )
        .unwrap();
        let ToolCall::Exec(args) = call else {
            panic!("expected exec");
        };
        assert_eq!(args.timeout_ms, Some(5000));
        assert_eq!(args.sandbox.as_deref(), Some("scratch"));
    }

    #[test]
    fn unknown_fields_and_tools_are_rejected() {
        let err = ToolCall::parse("exec", json!({"command": "ls", "shell": "zsh"})).unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidArguments);
        assert!(err.to_string().contains("shell"));

        let err = ToolCall::parse("rm_rf", json!({})).unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::UnknownTool);
    }

    #[test]
    fn null_arguments_mean_no_arguments() {
        assert_eq!(
            ToolCall::parse("list_sandboxes", Value::Null).unwrap(),
            ToolCall::ListSandboxes(NoArgs {})
        );
        let err = ToolCall::parse("list_sandboxes", json!([1])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn field_validation() {
        assert!(ToolCall::parse("exec", json!({"command": "  "})).is_err());
        assert!(ToolCall::parse("exec", json!({"command": "ls", "timeoutMs": 0})).is_err());
        assert!(ToolCall::parse("read_file", json!({"path": "a", "offset": 0})).is_err());
        assert!(ToolCall::parse("edit_file", json!({"path": "a", "edits": []})).is_err());
        assert!(ToolCall::parse("discover_skills", json!({"roots": ["../x"]})).is_err());
    }

    #[test]
    fn secure_request_defaults_to_get() {
        let call = ToolCall::parse(
            "secure_http_request",
            json!({"alias": "gh", "url": "https://api.github.com/user"}),
        )
        .unwrap();
        let ToolCall::SecureHttpRequest(req) = call else {
            panic!("expected secure_http_request");
        };
        assert_eq!(req.method, "GET");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn check_domain_accepts_urls() {
        let args = CheckDomainArgs {
            host: "https://Example.com:8443/path".into(),
        };
        assert_eq!(args.host(), "example.com");
    }
}
