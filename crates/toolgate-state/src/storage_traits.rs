//! Storage trait definitions for toolgate
//!
//! These traits are the keyed-store capabilities the tool layer consumes:
//! - `CredentialVault`: per-agent credential lookup (secret only by alias)
//! - `PolicyStore`: whole-document network policy storage plus sync status
//! - `SandboxDirectory`: home/ephemeral sandbox records per agent
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::schema::{Credential, CredentialSummary, NetworkPolicy, PolicySyncStatus, SandboxRecord};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// CredentialVault
// ---------------------------------------------------------------------------

/// Credential lookup scoped to an agent.
///
/// Guarantees:
/// - `list_credentials_for_agent` never returns secret material.
/// - `get_credential_for_agent_by_alias` returns `None` for credentials that
///   exist but are not assigned to the agent.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn list_credentials_for_agent(
        &self,
        agent_id: &str,
    ) -> StorageResult<Vec<CredentialSummary>>;

    async fn get_credential_for_agent_by_alias(
        &self,
        agent_id: &str,
        alias: &str,
    ) -> StorageResult<Option<Credential>>;
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// Whole-document network policy storage.
///
/// Guarantees:
/// - `replace_policy` overwrites the previous policy atomically; there is no
///   partial update.
/// - `load_policy` returns exactly what was last stored.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn load_policy(&self, agent_id: &str) -> StorageResult<Option<NetworkPolicy>>;

    async fn replace_policy(&self, agent_id: &str, policy: NetworkPolicy) -> StorageResult<()>;

    async fn record_sync(&self, agent_id: &str, status: PolicySyncStatus) -> StorageResult<()>;

    async fn load_sync_status(&self, agent_id: &str) -> StorageResult<Option<PolicySyncStatus>>;

    /// Agents whose stored policy has not been confirmed on their sandbox.
    async fn pending_syncs(&self) -> StorageResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// SandboxDirectory
// ---------------------------------------------------------------------------

/// Sandbox records per agent.
///
/// Guarantees:
/// - at most one `home` sandbox per agent (`DuplicateHomeSandbox` otherwise);
/// - `delete_sandbox` refuses home sandboxes (`HomeSandboxProtected`).
#[async_trait]
pub trait SandboxDirectory: Send + Sync {
    async fn list_sandboxes(&self, agent_id: &str) -> StorageResult<Vec<SandboxRecord>>;

    async fn get_sandbox(&self, agent_id: &str, name: &str)
        -> StorageResult<Option<SandboxRecord>>;

    async fn upsert_sandbox(&self, agent_id: &str, record: SandboxRecord) -> StorageResult<()>;

    async fn touch_sandbox(
        &self,
        agent_id: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn delete_sandbox(&self, agent_id: &str, name: &str) -> StorageResult<()>;

    /// Convenience: the agent's home sandbox, if registered.
    async fn home_sandbox(&self, agent_id: &str) -> StorageResult<Option<SandboxRecord>> {
        let all = self.list_sandboxes(agent_id).await?;
        Ok(all
            .into_iter()
            .find(|s| s.kind == crate::schema::SandboxKind::Home))
    }
}
