//! Compilation of a policy into the rule set the sandbox-side enforcer reads.

use serde::{Deserialize, Serialize};
use toolgate_state::{NetworkPolicy, PolicyMode, RuleAction};

use super::engine::default_action;
use super::pattern::{normalize_host, DomainPattern};

/// Format version of the JSON document written to the sandbox.
pub const ENFORCEMENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementRule {
    pub pattern: DomainPattern,
    pub action: RuleAction,
}

/// Normalized, pre-parsed rules plus the fallback action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementRuleSet {
    pub version: u32,
    pub mode: PolicyMode,
    pub default_action: RuleAction,
    pub rules: Vec<EnforcementRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
}

impl EnforcementRuleSet {
    /// Compile `policy`. Unparsable rules are dropped; unrestricted policies
    /// compile to no rules with an allow fallback.
    pub fn compile(policy: &NetworkPolicy) -> Self {
        let rules = if policy.mode == PolicyMode::Unrestricted {
            Vec::new()
        } else {
            policy
                .rules
                .iter()
                .filter_map(|r| {
                    DomainPattern::parse(&r.domain)
                        .ok()
                        .map(|pattern| EnforcementRule {
                            pattern,
                            action: r.action,
                        })
                })
                .collect()
        };
        Self {
            version: ENFORCEMENT_FORMAT_VERSION,
            mode: policy.mode,
            default_action: default_action(policy.mode),
            rules,
            preset_id: policy.preset_id.clone(),
        }
    }

    /// Decision the enforcer will make for `host`.
    pub fn decide(&self, host: &str) -> RuleAction {
        let host = normalize_host(host);
        self.rules
            .iter()
            .find(|r| r.pattern.matches_normalized(&host))
            .map(|r| r.action)
            .unwrap_or(self.default_action)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_policy::engine::evaluate;
    use crate::network_policy::presets::presets;
    use toolgate_state::PolicyRule;

    #[test]
    fn compiled_rules_agree_with_engine_for_presets() {
        let hosts = [
            "github.com",
            "api.github.com",
            "raw.githubusercontent.com",
            "pypi.org",
            "example.org",
            "localhost",
        ];
        for preset in presets() {
            let policy = preset.instantiate();
            let compiled = EnforcementRuleSet::compile(&policy);
            for host in hosts {
                assert_eq!(
                    compiled.decide(host),
                    evaluate(&policy, host).action,
                    "{} disagrees on {host}",
                    preset.id
                );
            }
        }
    }

    #[test]
    fn unrestricted_compiles_to_allow_fallback() {
        let policy = NetworkPolicy::new(PolicyMode::Unrestricted, vec![PolicyRule::deny("*")]);
        let compiled = EnforcementRuleSet::compile(&policy);
        assert!(compiled.rules.is_empty());
        assert_eq!(compiled.decide("anything"), RuleAction::Allow);
    }

    #[test]
    fn json_shape_is_camel_case() {
        let policy = NetworkPolicy::new(
            PolicyMode::AllowList,
            vec![PolicyRule::allow("*.Example.com"), PolicyRule::deny("*")],
        );
        let json: serde_json::Value =
            serde_json::from_str(&EnforcementRuleSet::compile(&policy).to_json().unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["defaultAction"], "deny");
        assert_eq!(json["mode"], "allow-list");
        assert_eq!(json["rules"][0]["pattern"]["kind"], "subdomains");
        assert_eq!(json["rules"][0]["pattern"]["value"], "example.com");
        assert_eq!(json["rules"][1]["pattern"]["kind"], "any");
    }
}
