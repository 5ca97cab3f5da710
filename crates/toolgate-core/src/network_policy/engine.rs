//! Policy evaluation: first-match-wins, with a mode-dependent fallback.

use serde::{Deserialize, Serialize};
use toolgate_state::{NetworkPolicy, PolicyMode, PolicyRule, RuleAction};

use super::pattern::{normalize_host, DomainPattern};

/// Outcome of evaluating one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub host: String,
    pub action: RuleAction,
    /// `None` when the mode fallback (or unrestricted mode) decided.
    pub matched_rule: Option<PolicyRule>,
    pub mode: PolicyMode,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.action == RuleAction::Allow
    }

    /// One-line explanation suitable for tool output.
    pub fn describe(&self) -> String {
        match (&self.matched_rule, self.mode) {
            (_, PolicyMode::Unrestricted) => {
                format!("{} is allowed (policy mode is unrestricted)", self.host)
            }
            (Some(rule), _) => format!(
                "{} is {} by rule '{}' ({})",
                self.host,
                verb(self.action),
                rule.domain,
                rule.action
            ),
            (None, mode) => format!(
                "{} is {}: no rule matched and {} defaults to {}",
                self.host,
                verb(self.action),
                mode,
                self.action
            ),
        }
    }
}

fn verb(action: RuleAction) -> &'static str {
    match action {
        RuleAction::Allow => "allowed",
        RuleAction::Deny => "denied",
    }
}

/// Action taken when no rule matches.
pub fn default_action(mode: PolicyMode) -> RuleAction {
    match mode {
        PolicyMode::AllowList => RuleAction::Deny,
        PolicyMode::DenyList | PolicyMode::Unrestricted => RuleAction::Allow,
    }
}

/// Evaluate `host` against `policy`.
///
/// `unrestricted` always allows. Otherwise rules are checked in order and the
/// first whose pattern matches decides; ordering, not specificity, breaks
/// ties. Rules with unparsable patterns never match.
pub fn evaluate(policy: &NetworkPolicy, host: &str) -> Decision {
    let host = normalize_host(host);

    if policy.mode == PolicyMode::Unrestricted {
        return Decision {
            host,
            action: RuleAction::Allow,
            matched_rule: None,
            mode: policy.mode,
        };
    }

    for rule in &policy.rules {
        let Ok(pattern) = DomainPattern::parse(&rule.domain) else {
            continue;
        };
        if pattern.matches_normalized(&host) {
            return Decision {
                host,
                action: rule.action,
                matched_rule: Some(rule.clone()),
                mode: policy.mode,
            };
        }
    }

    Decision {
        host,
        action: default_action(policy.mode),
        matched_rule: None,
        mode: policy.mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list(rules: Vec<PolicyRule>) -> NetworkPolicy {
        NetworkPolicy::new(PolicyMode::AllowList, rules)
    }

    #[test]
    fn unrestricted_allows_even_with_deny_rules() {
        let policy = NetworkPolicy::new(PolicyMode::Unrestricted, vec![PolicyRule::deny("*")]);
        let d = evaluate(&policy, "anything.example");
        assert!(d.is_allowed());
        assert!(d.matched_rule.is_none());
    }

    #[test]
    fn first_match_wins_over_specificity() {
        let policy = allow_list(vec![
            PolicyRule::deny("*.github.com"),
            PolicyRule::allow("api.github.com"),
            PolicyRule::deny("*"),
        ]);
        let d = evaluate(&policy, "api.github.com");
        assert_eq!(d.action, RuleAction::Deny);
        assert_eq!(d.matched_rule.unwrap().domain, "*.github.com");
    }

    #[test]
    fn fallback_depends_on_mode() {
        let rules = vec![PolicyRule::allow("github.com")];
        let d = evaluate(&allow_list(rules.clone()), "example.org");
        assert_eq!(d.action, RuleAction::Deny);
        assert!(d.matched_rule.is_none());

        let deny_list = NetworkPolicy::new(PolicyMode::DenyList, vec![PolicyRule::deny("evil.test")]);
        assert!(evaluate(&deny_list, "example.org").is_allowed());
        assert!(!evaluate(&deny_list, "EVIL.test.").is_allowed());
    }

    #[test]
    fn terminal_catch_all_always_matches() {
        let policy = allow_list(vec![PolicyRule::allow("github.com"), PolicyRule::deny("*")]);
        for host in ["github.com", "example.org", "a.b.c.d", "localhost"] {
            let d = evaluate(&policy, host);
            assert!(d.matched_rule.is_some(), "no rule matched {host}");
        }
    }

    #[test]
    fn invalid_rules_are_skipped() {
        let policy = allow_list(vec![
            PolicyRule::deny("https://github.com"),
            PolicyRule::allow("github.com"),
            PolicyRule::deny("*"),
        ]);
        assert!(evaluate(&policy, "github.com").is_allowed());
    }

    #[test]
    fn describe_mentions_rule_or_fallback() {
        let policy = allow_list(vec![PolicyRule::allow("github.com")]);
        assert!(evaluate(&policy, "github.com").describe().contains("rule 'github.com'"));
        assert!(evaluate(&policy, "x.org").describe().contains("defaults to deny"));
    }
}
