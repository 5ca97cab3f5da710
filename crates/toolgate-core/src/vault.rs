//! Credential vault adapter: alias resolution and placement rules.
//!
//! The adapter sits between the tools and the vault capability. Listing
//! produces agent-visible summaries only; resolving returns the full
//! credential (secret included) to the request interpolation path and
//! nowhere else.

use std::sync::Arc;

use serde::Serialize;
use toolgate_state::{Credential, CredentialVault};

use crate::result::{PlaceholderLocation, ToolError};

/// `{alias}`, the literal an agent writes where the secret should go.
pub fn placeholder(alias: &str) -> String {
    format!("{{{alias}}}")
}

/// Whether `credential` may be placed at `location`.
pub fn permits(credential: &Credential, location: PlaceholderLocation) -> bool {
    match location {
        PlaceholderLocation::Header => credential.allowed_in_header,
        PlaceholderLocation::Query => credential.allowed_in_query,
        PlaceholderLocation::Body => credential.allowed_in_body,
        PlaceholderLocation::Url => false,
    }
}

/// Human-readable list of permitted locations.
pub fn permitted_locations(credential: &Credential) -> String {
    let names: Vec<&str> = [
        (credential.allowed_in_header, "header"),
        (credential.allowed_in_query, "query"),
        (credential.allowed_in_body, "body"),
    ]
    .iter()
    .filter(|(allowed, _)| *allowed)
    .map(|(_, name)| *name)
    .collect();
    if names.is_empty() {
        "nowhere".to_string()
    } else {
        names.join(", ")
    }
}

/// Agent-visible description of one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialListing {
    pub alias: String,
    pub provider: String,
    pub allowed_hosts: Vec<String>,
    pub allowed_in_header: bool,
    pub allowed_in_query: bool,
    pub allowed_in_body: bool,
    pub placeholder: String,
}

impl CredentialListing {
    pub fn render(&self) -> String {
        let mut locations = Vec::new();
        if self.allowed_in_header {
            locations.push("header");
        }
        if self.allowed_in_query {
            locations.push("query");
        }
        if self.allowed_in_body {
            locations.push("body");
        }
        format!(
            "- {} ({}): use {} in {}; hosts: {}",
            self.alias,
            self.provider,
            self.placeholder,
            if locations.is_empty() {
                "no location".to_string()
            } else {
                locations.join(", ")
            },
            self.allowed_hosts.join(", ")
        )
    }
}

#[derive(Clone)]
pub struct VaultAdapter {
    vault: Arc<dyn CredentialVault>,
}

impl VaultAdapter {
    pub fn new(vault: Arc<dyn CredentialVault>) -> Self {
        Self { vault }
    }

    /// Enabled credentials assigned to `agent_id`, sorted by alias.
    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<CredentialListing>, ToolError> {
        let mut listings: Vec<CredentialListing> = self
            .vault
            .list_credentials_for_agent(agent_id)
            .await?
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| CredentialListing {
                placeholder: placeholder(&c.alias),
                alias: c.alias,
                provider: c.provider,
                allowed_hosts: c.allowed_hosts,
                allowed_in_header: c.allowed_in_header,
                allowed_in_query: c.allowed_in_query,
                allowed_in_body: c.allowed_in_body,
            })
            .collect();
        listings.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(listings)
    }

    /// Resolve `alias` for `agent_id`; missing or disabled credentials are
    /// reported the same way to the agent.
    pub async fn resolve(&self, agent_id: &str, alias: &str) -> Result<Credential, ToolError> {
        match self
            .vault
            .get_credential_for_agent_by_alias(agent_id, alias)
            .await?
        {
            Some(credential) if credential.enabled => Ok(credential),
            Some(_) => Err(ToolError::CredentialNotAssigned {
                alias: alias.to_string(),
                reason: "is disabled".to_string(),
            }),
            None => Err(ToolError::CredentialNotAssigned {
                alias: alias.to_string(),
                reason: "is not assigned to this agent; call list_credentials to see available aliases"
                    .to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_state::fakes::MemoryCredentialVault;
    use toolgate_state::Secret;

    fn credential(alias: &str, enabled: bool) -> Credential {
        Credential {
            alias: alias.into(),
            provider: "test".into(),
            allowed_hosts: vec!["api.test".into()],
            allowed_in_header: true,
            allowed_in_query: false,
            allowed_in_body: true,
            enabled,
            secret: Secret::new(format!("secret-{alias}")),
        }
    }

    fn adapter() -> VaultAdapter {
        let vault = MemoryCredentialVault::new();
        vault.assign("agent", credential("zeta", true)).unwrap();
        vault.assign("agent", credential("alpha", true)).unwrap();
        vault.assign("agent", credential("off", false)).unwrap();
        VaultAdapter::new(Arc::new(vault))
    }

    #[tokio::test]
    async fn listing_skips_disabled_sorts_and_hides_secret() {
        let listings = adapter().list_for_agent("agent").await.unwrap();
        let aliases: Vec<_> = listings.iter().map(|l| l.alias.as_str()).collect();
        assert_eq!(aliases, ["alpha", "zeta"]);
        assert_eq!(listings[0].placeholder, "{alpha}");
        let rendered = listings[0].render();
        assert!(rendered.contains("header, body"));
        assert!(!rendered.contains("secret-alpha"));
    }

    #[tokio::test]
    async fn resolve_rejects_missing_and_disabled() {
        let adapter = adapter();
        assert_eq!(
            adapter.resolve("agent", "alpha").await.unwrap().secret.expose(),
            "secret-alpha"
        );
        let missing = adapter.resolve("agent", "nope").await.unwrap_err();
        assert!(missing.to_string().starts_with("CredentialNotAssigned:"));
        let disabled = adapter.resolve("agent", "off").await.unwrap_err();
        assert!(disabled.to_string().contains("disabled"));
        let other_agent = adapter.resolve("someone-else", "alpha").await.unwrap_err();
        assert!(matches!(other_agent, ToolError::CredentialNotAssigned { .. }));
    }

    #[test]
    fn placement_helpers() {
        let c = credential("x", true);
        assert!(permits(&c, PlaceholderLocation::Header));
        assert!(!permits(&c, PlaceholderLocation::Query));
        assert!(!permits(&c, PlaceholderLocation::Url));
        assert_eq!(permitted_locations(&c), "header, body");
    }
}
