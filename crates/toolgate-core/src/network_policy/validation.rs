//! Structural validation of network policies.
//!
//! Validation never fails with `Err`: it collects every violation as a
//! string so a caller can show all of them at once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use toolgate_state::{NetworkPolicy, PolicyMode, PolicyRule, RuleAction};

use super::pattern::{normalize_host, DomainPattern};

/// A rule as received from an untrusted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub domain: String,
    pub action: String,
}

/// A whole policy as received from an untrusted source. Enum-valued fields
/// stay strings so a bad value is reported, not a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    pub mode: String,
    #[serde(default)]
    pub rules: Vec<RuleDraft>,
    #[serde(default)]
    pub preset_id: Option<String>,
}

impl From<&NetworkPolicy> for PolicyDraft {
    fn from(policy: &NetworkPolicy) -> Self {
        Self {
            mode: policy.mode.to_string(),
            rules: policy
                .rules
                .iter()
                .map(|r| RuleDraft {
                    domain: r.domain.clone(),
                    action: r.action.to_string(),
                })
                .collect(),
            preset_id: policy.preset_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validator carrying the catch-all strictness setting.
#[derive(Debug, Clone, Copy)]
pub struct PolicyValidator {
    strict_catch_all: bool,
}

impl Default for PolicyValidator {
    fn default() -> Self {
        Self::strict()
    }
}

impl PolicyValidator {
    pub fn new(strict_catch_all: bool) -> Self {
        Self { strict_catch_all }
    }

    pub fn strict() -> Self {
        Self::new(true)
    }

    pub fn permissive() -> Self {
        Self::new(false)
    }

    pub fn validate_policy(&self, policy: &NetworkPolicy) -> ValidationReport {
        self.validate(&PolicyDraft::from(policy))
    }

    pub fn validate(&self, draft: &PolicyDraft) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Err(e) = draft.mode.parse::<PolicyMode>() {
            errors.push(e);
        }

        if draft.rules.is_empty() {
            errors.push("policy must contain at least one rule".to_string());
        }

        let mut seen = HashSet::new();
        let mut catch_all_positions = Vec::new();
        for (idx, rule) in draft.rules.iter().enumerate() {
            let n = idx + 1;
            match DomainPattern::parse(&rule.domain) {
                Ok(pattern) => {
                    if pattern.is_catch_all() {
                        catch_all_positions.push(idx);
                    }
                    let key = normalize_host(&rule.domain);
                    if !seen.insert(key.clone()) {
                        warnings.push(format!(
                            "rule {n}: duplicate pattern '{key}' can never match"
                        ));
                    }
                }
                Err(reason) => errors.push(format!("rule {n}: {reason}")),
            }
            if let Err(e) = rule.action.parse::<RuleAction>() {
                errors.push(format!("rule {n}: {e}"));
            }
        }

        let last = draft.rules.len().saturating_sub(1);
        for &idx in &catch_all_positions {
            if idx != last {
                errors.push(format!(
                    "rule {}: catch-all '*' must be the last rule; rules after it can never match",
                    idx + 1
                ));
            }
        }
        if catch_all_positions.is_empty() && !draft.rules.is_empty() {
            let msg = "policy has no catch-all rule: the last rule should be '*' so every host \
                       has an explicit decision"
                .to_string();
            if self.strict_catch_all {
                errors.push(msg);
            } else {
                warnings.push(msg);
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Validate and convert. On failure returns the full report.
    pub fn parse(&self, draft: &PolicyDraft) -> Result<(NetworkPolicy, ValidationReport), ValidationReport> {
        let report = self.validate(draft);
        if !report.valid {
            return Err(report);
        }
        let (Ok(mode), Ok(rules)) = (
            draft.mode.parse::<PolicyMode>(),
            draft
                .rules
                .iter()
                .map(|r| {
                    r.action.parse::<RuleAction>().map(|action| PolicyRule {
                        domain: r.domain.trim().to_string(),
                        action,
                    })
                })
                .collect::<Result<Vec<_>, _>>(),
        ) else {
            return Err(report);
        };
        let mut policy = NetworkPolicy::new(mode, rules);
        policy.preset_id = draft.preset_id.clone();
        Ok((policy, report))
    }
}
