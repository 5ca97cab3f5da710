//! In-memory implementations of the storage traits
//!
//! Provides `MemoryCredentialVault`, `MemoryPolicyStore` and
//! `MemorySandboxDirectory`. They satisfy the trait contracts without any
//! external dependencies and back the CLI's local mode as well as tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::schema::{
    Credential, CredentialSummary, NetworkPolicy, PolicySyncStatus, SandboxKind, SandboxRecord,
};
use crate::storage_traits::*;

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Backend("in-memory store lock poisoned".to_string())
}

// ---------------------------------------------------------------------------
// MemoryCredentialVault
// ---------------------------------------------------------------------------

/// Credentials keyed by agent, then alias.
#[derive(Debug, Default)]
pub struct MemoryCredentialVault {
    by_agent: Mutex<HashMap<String, BTreeMap<String, Credential>>>,
}

impl MemoryCredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a credential to an agent, replacing any credential with the same alias.
    pub fn assign(&self, agent_id: &str, credential: Credential) -> StorageResult<()> {
        let mut guard = self.by_agent.lock().map_err(poisoned)?;
        guard
            .entry(agent_id.to_string())
            .or_default()
            .insert(credential.alias.clone(), credential);
        Ok(())
    }

    pub fn revoke(&self, agent_id: &str, alias: &str) -> StorageResult<()> {
        let mut guard = self.by_agent.lock().map_err(poisoned)?;
        if let Some(creds) = guard.get_mut(agent_id) {
            creds.remove(alias);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialVault for MemoryCredentialVault {
    async fn list_credentials_for_agent(
        &self,
        agent_id: &str,
    ) -> StorageResult<Vec<CredentialSummary>> {
        let guard = self.by_agent.lock().map_err(poisoned)?;
        Ok(guard
            .get(agent_id)
            .map(|creds| creds.values().map(Credential::summary).collect())
            .unwrap_or_default())
    }

    async fn get_credential_for_agent_by_alias(
        &self,
        agent_id: &str,
        alias: &str,
    ) -> StorageResult<Option<Credential>> {
        let guard = self.by_agent.lock().map_err(poisoned)?;
        Ok(guard
            .get(agent_id)
            .and_then(|creds| creds.get(alias))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryPolicyStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policies: Mutex<HashMap<String, NetworkPolicy>>,
    sync: Mutex<HashMap<String, PolicySyncStatus>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn load_policy(&self, agent_id: &str) -> StorageResult<Option<NetworkPolicy>> {
        let guard = self.policies.lock().map_err(poisoned)?;
        Ok(guard.get(agent_id).cloned())
    }

    async fn replace_policy(&self, agent_id: &str, policy: NetworkPolicy) -> StorageResult<()> {
        let mut guard = self.policies.lock().map_err(poisoned)?;
        guard.insert(agent_id.to_string(), policy);
        Ok(())
    }

    async fn record_sync(&self, agent_id: &str, status: PolicySyncStatus) -> StorageResult<()> {
        let mut guard = self.sync.lock().map_err(poisoned)?;
        guard.insert(agent_id.to_string(), status);
        Ok(())
    }

    async fn load_sync_status(&self, agent_id: &str) -> StorageResult<Option<PolicySyncStatus>> {
        let guard = self.sync.lock().map_err(poisoned)?;
        Ok(guard.get(agent_id).cloned())
    }

    async fn pending_syncs(&self) -> StorageResult<Vec<String>> {
        let guard = self.sync.lock().map_err(poisoned)?;
        let mut agents: Vec<String> = guard
            .iter()
            .filter(|(_, status)| status.pending)
            .map(|(agent, _)| agent.clone())
            .collect();
        agents.sort();
        Ok(agents)
    }
}

// ---------------------------------------------------------------------------
// MemorySandboxDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySandboxDirectory {
    by_agent: Mutex<HashMap<String, BTreeMap<String, SandboxRecord>>>,
}

impl MemorySandboxDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SandboxDirectory for MemorySandboxDirectory {
    async fn list_sandboxes(&self, agent_id: &str) -> StorageResult<Vec<SandboxRecord>> {
        let guard = self.by_agent.lock().map_err(poisoned)?;
        Ok(guard
            .get(agent_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_sandbox(
        &self,
        agent_id: &str,
        name: &str,
    ) -> StorageResult<Option<SandboxRecord>> {
        let guard = self.by_agent.lock().map_err(poisoned)?;
        Ok(guard.get(agent_id).and_then(|m| m.get(name)).cloned())
    }

    async fn upsert_sandbox(&self, agent_id: &str, record: SandboxRecord) -> StorageResult<()> {
        let mut guard = self.by_agent.lock().map_err(poisoned)?;
        let sandboxes = guard.entry(agent_id.to_string()).or_default();

        if record.kind == SandboxKind::Home {
            if let Some(existing) = sandboxes
                .values()
                .find(|s| s.kind == SandboxKind::Home && s.name != record.name)
            {
                return Err(StorageError::DuplicateHomeSandbox {
                    agent_id: agent_id.to_string(),
                    existing: existing.name.clone(),
                });
            }
        }

        sandboxes.insert(record.name.clone(), record);
        Ok(())
    }

    async fn touch_sandbox(
        &self,
        agent_id: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.by_agent.lock().map_err(poisoned)?;
        let record = guard
            .get_mut(agent_id)
            .and_then(|m| m.get_mut(name))
            .ok_or_else(|| StorageError::NotFound {
                kind: "sandbox",
                key: format!("{agent_id}/{name}"),
            })?;
        record.last_used_at = at;
        Ok(())
    }

    async fn delete_sandbox(&self, agent_id: &str, name: &str) -> StorageResult<()> {
        let mut guard = self.by_agent.lock().map_err(poisoned)?;
        let sandboxes = guard
            .get_mut(agent_id)
            .ok_or_else(|| StorageError::NotFound {
                kind: "sandbox",
                key: format!("{agent_id}/{name}"),
            })?;
        match sandboxes.get(name) {
            None => Err(StorageError::NotFound {
                kind: "sandbox",
                key: format!("{agent_id}/{name}"),
            }),
            Some(record) if !record.is_deletable() => Err(StorageError::HomeSandboxProtected {
                name: name.to_string(),
            }),
            Some(_) => {
                sandboxes.remove(name);
                Ok(())
            }
        }
    }
}
