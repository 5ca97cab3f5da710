//! Pushing compiled rule sets to the agent's home sandbox.

use std::sync::Arc;

use async_trait::async_trait;
use toolgate_state::SandboxRecord;

use super::enforcement::EnforcementRuleSet;
use crate::sandbox::{SandboxCapability, SandboxIoError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("agent '{agent_id}' has no home sandbox to sync to")]
    NoHomeSandbox { agent_id: String },

    #[error("failed to encode rule set: {0}")]
    Encode(String),

    #[error("push to sandbox '{sandbox}' failed: {source}")]
    Push {
        sandbox: String,
        #[source]
        source: SandboxIoError,
    },
}

/// Delivers a compiled rule set to a sandbox's enforcement point.
#[async_trait]
pub trait PolicySyncer: Send + Sync {
    async fn push(
        &self,
        agent_id: &str,
        sandbox: &SandboxRecord,
        rules: &EnforcementRuleSet,
    ) -> Result<(), SyncError>;
}

/// Writes the rule set as JSON to a fixed path inside the sandbox.
pub struct SandboxFileSyncer {
    sandbox: Arc<dyn SandboxCapability>,
    path: String,
}

impl SandboxFileSyncer {
    pub fn new(sandbox: Arc<dyn SandboxCapability>, path: impl Into<String>) -> Self {
        Self {
            sandbox,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl PolicySyncer for SandboxFileSyncer {
    async fn push(
        &self,
        agent_id: &str,
        sandbox: &SandboxRecord,
        rules: &EnforcementRuleSet,
    ) -> Result<(), SyncError> {
        let json = rules.to_json().map_err(|e| SyncError::Encode(e.to_string()))?;
        tracing::debug!(
            agent_id,
            sandbox = %sandbox.name,
            path = %self.path,
            rules = rules.rules.len(),
            "writing enforcement rule set"
        );
        self.sandbox
            .write_file(&sandbox.machine_id, &self.path, &json)
            .await
            .map_err(|source| SyncError::Push {
                sandbox: sandbox.name.clone(),
                source,
            })
    }
}
