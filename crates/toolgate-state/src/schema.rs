//! Record types persisted by the state layer.
//!
//! These are the shapes shared between storage backends and the tool layer:
//! credentials (with their placement rules), network policies, sandbox
//! records and policy sync bookkeeping. Behaviour that interprets them
//! (policy evaluation, placement checks) lives in `toolgate-core`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Opaque secret material.
///
/// `Debug` and `Display` never print the value; callers must go through
/// [`Secret::expose`] to read it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Only the request interpolation path should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// A managed credential assigned to one or more agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Unique, human-chosen alias. Agents reference the credential as `{alias}`.
    pub alias: String,
    /// Free-form provider tag (e.g. "github", "stripe").
    pub provider: String,
    /// Exact-match host list the secret may be sent to.
    pub allowed_hosts: Vec<String>,
    pub allowed_in_header: bool,
    pub allowed_in_query: bool,
    pub allowed_in_body: bool,
    pub enabled: bool,
    pub secret: Secret,
}

impl Credential {
    /// Agent-visible projection without the secret.
    pub fn summary(&self) -> CredentialSummary {
        CredentialSummary {
            alias: self.alias.clone(),
            provider: self.provider.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
            allowed_in_header: self.allowed_in_header,
            allowed_in_query: self.allowed_in_query,
            allowed_in_body: self.allowed_in_body,
            enabled: self.enabled,
        }
    }
}

/// Credential metadata safe to show to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub alias: String,
    pub provider: String,
    pub allowed_hosts: Vec<String>,
    pub allowed_in_header: bool,
    pub allowed_in_query: bool,
    pub allowed_in_body: bool,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Network policy
// ---------------------------------------------------------------------------

/// How a network policy treats hosts that no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    AllowList,
    DenyList,
    Unrestricted,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::AllowList => "allow-list",
            PolicyMode::DenyList => "deny-list",
            PolicyMode::Unrestricted => "unrestricted",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow-list" => Ok(PolicyMode::AllowList),
            "deny-list" => Ok(PolicyMode::DenyList),
            "unrestricted" => Ok(PolicyMode::Unrestricted),
            other => Err(format!(
                "unknown policy mode '{other}' (expected allow-list, deny-list or unrestricted)"
            )),
        }
    }
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(RuleAction::Allow),
            "deny" => Ok(RuleAction::Deny),
            other => Err(format!(
                "unknown rule action '{other}' (expected allow or deny)"
            )),
        }
    }
}

/// A single `(domain pattern, action)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub domain: String,
    pub action: RuleAction,
}

impl PolicyRule {
    pub fn allow(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            action: RuleAction::Allow,
        }
    }

    pub fn deny(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            action: RuleAction::Deny,
        }
    }
}

/// A per-agent network access policy. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    pub mode: PolicyMode,
    pub rules: Vec<PolicyRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
    #[serde(default)]
    pub customized: bool,
}

impl NetworkPolicy {
    pub fn new(mode: PolicyMode, rules: Vec<PolicyRule>) -> Self {
        Self {
            mode,
            rules,
            preset_id: None,
            customized: false,
        }
    }
}

/// Sync bookkeeping for pushing a policy to the remote enforcement point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySyncStatus {
    /// True while the stored policy has not been confirmed on the sandbox.
    pub pending: bool,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PolicySyncStatus {
    /// Status right after a policy was stored but before any push.
    pub fn awaiting_push() -> Self {
        Self {
            pending: true,
            ..Self::default()
        }
    }

    pub fn succeeded(&self, at: DateTime<Utc>) -> Self {
        Self {
            pending: false,
            attempts: self.attempts + 1,
            last_attempt_at: Some(at),
            last_success_at: Some(at),
            last_error: None,
        }
    }

    pub fn failed(&self, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            pending: true,
            attempts: self.attempts + 1,
            last_attempt_at: Some(at),
            last_success_at: self.last_success_at,
            last_error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sandboxes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxKind {
    /// The agent's persistent sandbox. Exactly one per agent, never deleted.
    Home,
    /// Disposable sandbox for isolated or parallel work.
    Ephemeral,
}

impl fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxKind::Home => f.write_str("home"),
            SandboxKind::Ephemeral => f.write_str("ephemeral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRecord {
    pub name: String,
    pub kind: SandboxKind,
    /// Identifier of the backing remote machine, used as the sandbox id on
    /// the execution capability.
    pub machine_id: String,
    pub last_used_at: DateTime<Utc>,
    pub stale_after_secs: u64,
}

impl SandboxRecord {
    pub fn home(name: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SandboxKind::Home,
            machine_id: machine_id.into(),
            last_used_at: Utc::now(),
            stale_after_secs: 7 * 24 * 3600,
        }
    }

    pub fn ephemeral(
        name: impl Into<String>,
        machine_id: impl Into<String>,
        stale_after_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SandboxKind::Ephemeral,
            machine_id: machine_id.into(),
            last_used_at: Utc::now(),
            stale_after_secs,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let threshold = Duration::seconds(i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX));
        now.signed_duration_since(self.last_used_at) > threshold
    }

    pub fn is_deletable(&self) -> bool {
        self.kind == SandboxKind::Ephemeral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_and_display_are_redacted() {
        let secret = Secret::new("ghp_supersecret");
        assert!(!format!("{secret:?}").contains("ghp_"));
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "ghp_supersecret");
    }

    #[test]
    fn credential_debug_does_not_leak_secret() {
        let cred = Credential {
            alias: "gh".into(),
            provider: "github".into(),
            allowed_hosts: vec!["api.github.com".into()],
            allowed_in_header: true,
            allowed_in_query: false,
            allowed_in_body: false,
            enabled: true,
            secret: Secret::new("ghp_supersecret"),
        };
        assert!(!format!("{cred:?}").contains("ghp_supersecret"));
        let summary = serde_json::to_string(&cred.summary()).unwrap();
        assert!(!summary.contains("ghp_supersecret"));
        assert!(summary.contains("allowedInHeader"));
    }

    #[test]
    fn policy_mode_wire_names() {
        let json = serde_json::to_string(&PolicyMode::AllowList).unwrap();
        assert_eq!(json, "\"allow-list\"");
        assert_eq!("deny-list".parse::<PolicyMode>(), Ok(PolicyMode::DenyList));
        assert!("allowlist".parse::<PolicyMode>().is_err());
    }

    #[test]
    fn policy_serializes_camel_case() {
        let mut policy = NetworkPolicy::new(PolicyMode::AllowList, vec![PolicyRule::deny("*")]);
        policy.preset_id = Some("lockdown".into());
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["presetId"], "lockdown");
        assert_eq!(value["rules"][0]["action"], "deny");
    }

    #[test]
    fn sync_status_transitions() {
        let now = Utc::now();
        let failed = PolicySyncStatus::awaiting_push().failed(now, "connection refused");
        assert!(failed.pending);
        assert_eq!(failed.attempts, 1);
        let ok = failed.succeeded(now);
        assert!(!ok.pending);
        assert_eq!(ok.attempts, 2);
        assert!(ok.last_error.is_none());
    }

    #[test]
    fn sandbox_staleness() {
        let mut sb = SandboxRecord::ephemeral("scratch", "vm-1", 60);
        let now = Utc::now();
        sb.last_used_at = now - Duration::seconds(30);
        assert!(!sb.is_stale(now));
        sb.last_used_at = now - Duration::seconds(61);
        assert!(sb.is_stale(now));
        assert!(sb.is_deletable());
        assert!(!SandboxRecord::home("home", "vm-0").is_deletable());
    }
}
