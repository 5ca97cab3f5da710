//! Runtime configuration for the tool layer.
//!
//! Every budget and timeout the components use is carried here and handed to
//! each component at construction, so tests can vary limits without touching
//! process-wide state. Loaded from TOML with per-field defaults, then
//! optionally overridden from `TOOLGATE_*` environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolgateConfig {
    pub session: SessionConfig,
    pub edit: EditConfig,
    pub http: HttpConfig,
    pub policy: PolicyConfig,
    pub sanitize: SanitizeConfig,
}

/// Remote Session Driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout handed to the sandbox for a single command (milliseconds).
    #[serde(default = "SessionConfig::default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Extra time the driver waits past `command_timeout_ms` before giving up locally.
    #[serde(default = "SessionConfig::default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,
    #[serde(default = "SessionConfig::default_max_stdout_bytes")]
    pub max_stdout_bytes: usize,
    #[serde(default = "SessionConfig::default_max_stderr_bytes")]
    pub max_stderr_bytes: usize,
    /// Per-sandbox environment file sourced before each command when present.
    #[serde(default = "SessionConfig::default_env_file")]
    pub env_file: String,
    /// `KEY=VALUE` pairs exported before each command.
    #[serde(default = "SessionConfig::default_env_prefix")]
    pub env_prefix: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: Self::default_command_timeout_ms(),
            timeout_grace_ms: Self::default_timeout_grace_ms(),
            max_stdout_bytes: Self::default_max_stdout_bytes(),
            max_stderr_bytes: Self::default_max_stderr_bytes(),
            env_file: Self::default_env_file(),
            env_prefix: Self::default_env_prefix(),
        }
    }
}

impl SessionConfig {
    const fn default_command_timeout_ms() -> u64 {
        120_000
    }

    const fn default_timeout_grace_ms() -> u64 {
        10_000
    }

    const fn default_max_stdout_bytes() -> usize {
        64 * 1024
    }

    const fn default_max_stderr_bytes() -> usize {
        16 * 1024
    }

    fn default_env_file() -> String {
        "/home/user/.toolgate_env".to_string()
    }

    fn default_env_prefix() -> Vec<String> {
        [
            "CI=1",
            "DEBIAN_FRONTEND=noninteractive",
            "GIT_TERMINAL_PROMPT=0",
            "PAGER=cat",
            "GIT_PAGER=cat",
            "NO_COLOR=1",
            "TERM=dumb",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }
}

/// How `read_file` renders lines and how `edit_file` interprets edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    Anchor,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditConfig {
    /// Hex characters kept from each line's SHA-256.
    #[serde(default = "EditConfig::default_anchor_hash_len")]
    pub anchor_hash_len: usize,
    /// Largest file `read_file` will render.
    #[serde(default = "EditConfig::default_max_read_bytes")]
    pub max_read_bytes: usize,
    /// Used when the run's context does not pick a mode.
    #[serde(default)]
    pub default_mode: EditMode,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            anchor_hash_len: Self::default_anchor_hash_len(),
            max_read_bytes: Self::default_max_read_bytes(),
            default_mode: EditMode::Anchor,
        }
    }
}

impl EditConfig {
    const fn default_anchor_hash_len() -> usize {
        6
    }

    const fn default_max_read_bytes() -> usize {
        512 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "HttpConfig::default_max_response_bytes")]
    pub max_response_bytes: usize,
    #[serde(default = "HttpConfig::default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            max_response_bytes: Self::default_max_response_bytes(),
            user_agent: Self::default_user_agent(),
        }
    }
}

impl HttpConfig {
    const fn default_timeout_ms() -> u64 {
        30_000
    }

    const fn default_max_response_bytes() -> usize {
        32 * 1024
    }

    fn default_user_agent() -> String {
        format!("toolgate/{}", env!("CARGO_PKG_VERSION"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// When true a policy without a terminal catch-all fails validation;
    /// when false it only produces a warning.
    #[serde(default = "PolicyConfig::default_strict_catch_all")]
    pub strict_catch_all: bool,
    /// Path inside the home sandbox the compiled rule set is written to.
    #[serde(default = "PolicyConfig::default_enforcement_path")]
    pub enforcement_path: String,
    /// Preset evaluated for agents that have no stored policy yet.
    #[serde(default = "PolicyConfig::default_preset")]
    pub default_preset: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strict_catch_all: Self::default_strict_catch_all(),
            enforcement_path: Self::default_enforcement_path(),
            default_preset: Self::default_preset(),
        }
    }
}

impl PolicyConfig {
    const fn default_strict_catch_all() -> bool {
        true
    }

    fn default_enforcement_path() -> String {
        "/etc/toolgate/network-policy.json".to_string()
    }

    fn default_preset() -> String {
        "unrestricted".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeConfig {
    #[serde(default = "SanitizeConfig::default_max_label_chars")]
    pub max_label_chars: usize,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            max_label_chars: Self::default_max_label_chars(),
        }
    }
}

impl SanitizeConfig {
    const fn default_max_label_chars() -> usize {
        64
    }
}

impl ToolgateConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `TOOLGATE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Split out so tests do not
    /// have to mutate the process environment.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })
        }

        if let Some(v) = lookup("TOOLGATE_COMMAND_TIMEOUT_MS") {
            self.session.command_timeout_ms = parse("TOOLGATE_COMMAND_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("TOOLGATE_MAX_STDOUT_BYTES") {
            self.session.max_stdout_bytes = parse("TOOLGATE_MAX_STDOUT_BYTES", v)?;
        }
        if let Some(v) = lookup("TOOLGATE_HTTP_TIMEOUT_MS") {
            self.http.timeout_ms = parse("TOOLGATE_HTTP_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("TOOLGATE_STRICT_CATCH_ALL") {
            self.policy.strict_catch_all = parse("TOOLGATE_STRICT_CATCH_ALL", v)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool); 6] = [
            ("session.command_timeout_ms", self.session.command_timeout_ms > 0),
            ("session.max_stdout_bytes", self.session.max_stdout_bytes > 0),
            ("edit.max_read_bytes", self.edit.max_read_bytes > 0),
            ("http.timeout_ms", self.http.timeout_ms > 0),
            ("http.max_response_bytes", self.http.max_response_bytes > 0),
            ("sanitize.max_label_chars", self.sanitize.max_label_chars > 0),
        ];
        for (key, ok) in checks {
            if !ok {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }
        if !(4..=64).contains(&self.edit.anchor_hash_len) {
            return Err(ConfigError::Invalid(
                "edit.anchor_hash_len must be between 4 and 64".to_string(),
            ));
        }
        if self.policy.enforcement_path.is_empty() || !self.policy.enforcement_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "policy.enforcement_path must be an absolute path".to_string(),
            ));
        }
        if crate::network_policy::presets::preset_policy(&self.policy.default_preset).is_none() {
            return Err(ConfigError::Invalid(format!(
                "policy.default_preset '{}' is not a known preset",
                self.policy.default_preset
            )));
        }
        Ok(())
    }
}
