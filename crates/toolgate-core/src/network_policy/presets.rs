//! Built-in, versioned policy presets.

use std::sync::OnceLock;

use serde::Serialize;
use toolgate_state::{NetworkPolicy, PolicyMode, PolicyRule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyPreset {
    pub id: &'static str,
    pub version: u32,
    pub description: &'static str,
    pub mode: PolicyMode,
    pub rules: Vec<PolicyRule>,
}

impl PolicyPreset {
    /// A fresh policy built from this preset, stamped with its id.
    pub fn instantiate(&self) -> NetworkPolicy {
        let mut policy = NetworkPolicy::new(self.mode, self.rules.clone());
        policy.preset_id = Some(self.id.to_string());
        policy.customized = false;
        policy
    }

    /// Whether `policy` deviates from this preset's mode or rules.
    pub fn differs_from(&self, policy: &NetworkPolicy) -> bool {
        policy.mode != self.mode || policy.rules != self.rules
    }
}

const GITHUB_HOSTS: &[&str] = &[
    "github.com",
    "*.github.com",
    "githubusercontent.com",
    "*.githubusercontent.com",
];

const PACKAGE_REGISTRIES: &[&str] = &[
    "registry.npmjs.org",
    "registry.yarnpkg.com",
    "pypi.org",
    "files.pythonhosted.org",
    "crates.io",
    "static.crates.io",
    "index.crates.io",
    "proxy.golang.org",
    "sum.golang.org",
    "rubygems.org",
];

fn allow_then_deny(hosts: &[&[&str]]) -> Vec<PolicyRule> {
    hosts
        .iter()
        .flat_map(|group| group.iter())
        .map(|h| PolicyRule::allow(*h))
        .chain(std::iter::once(PolicyRule::deny("*")))
        .collect()
}

fn builtin() -> &'static [PolicyPreset] {
    static PRESETS: OnceLock<Vec<PolicyPreset>> = OnceLock::new();
    PRESETS.get_or_init(|| {
        vec![
            PolicyPreset {
                id: "unrestricted",
                version: 1,
                description: "Any host may be reached",
                mode: PolicyMode::Unrestricted,
                rules: vec![PolicyRule::allow("*")],
            },
            PolicyPreset {
                id: "github-only",
                version: 1,
                description: "GitHub and its content hosts only",
                mode: PolicyMode::AllowList,
                rules: allow_then_deny(&[GITHUB_HOSTS]),
            },
            PolicyPreset {
                id: "development",
                version: 2,
                description: "GitHub plus the common package registries",
                mode: PolicyMode::AllowList,
                rules: allow_then_deny(&[GITHUB_HOSTS, PACKAGE_REGISTRIES]),
            },
            PolicyPreset {
                id: "lockdown",
                version: 1,
                description: "No outbound network access",
                mode: PolicyMode::AllowList,
                rules: vec![PolicyRule::deny("*")],
            },
        ]
    })
}

/// All presets, in display order.
pub fn presets() -> &'static [PolicyPreset] {
    builtin()
}

pub fn find_preset(id: &str) -> Option<&'static PolicyPreset> {
    builtin().iter().find(|p| p.id == id)
}

/// Instantiate preset `id` as a new, uncustomized policy.
pub fn preset_policy(id: &str) -> Option<NetworkPolicy> {
    find_preset(id).map(PolicyPreset::instantiate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_policy::validation::PolicyValidator;

    #[test]
    fn every_preset_validates_strictly() {
        for preset in presets() {
            let report = PolicyValidator::strict().validate_policy(&preset.instantiate());
            assert!(report.valid, "{}: {:?}", preset.id, report.errors);
            assert!(report.warnings.is_empty(), "{}: {:?}", preset.id, report.warnings);
        }
    }

    #[test]
    fn fetched_preset_is_stamped_and_independent() {
        let mut a = preset_policy("github-only").unwrap();
        assert_eq!(a.preset_id.as_deref(), Some("github-only"));
        assert!(!a.customized);

        a.rules.clear();
        let b = preset_policy("github-only").unwrap();
        assert!(!b.rules.is_empty());
    }

    #[test]
    fn differs_from_detects_edits() {
        let preset = find_preset("development").unwrap();
        let mut policy = preset.instantiate();
        assert!(!preset.differs_from(&policy));
        policy.rules.insert(0, PolicyRule::allow("example.com"));
        assert!(preset.differs_from(&policy));
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset_policy("nope").is_none());
    }
}
