//! Replace-whole-policy workflow: validate, store, then sync.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use toolgate_state::{NetworkPolicy, PolicyStore, PolicySyncStatus, SandboxDirectory};
use tracing::instrument;

use super::engine::{evaluate, Decision};
use super::enforcement::EnforcementRuleSet;
use super::presets::{find_preset, preset_policy};
use super::sync::{PolicySyncer, SyncError};
use super::validation::{PolicyDraft, PolicyValidator, ValidationReport};
use crate::config::PolicyConfig;
use crate::metrics::METRICS;
use crate::obs;
use crate::result::ToolError;

/// Whether the enforcement point has the stored policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced,
    /// Stored but not confirmed on the sandbox; retry later.
    Pending { error: String },
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub policy: NetworkPolicy,
    pub warnings: Vec<String>,
    pub sync: SyncOutcome,
}

pub struct PolicyService {
    store: Arc<dyn PolicyStore>,
    sandboxes: Arc<dyn SandboxDirectory>,
    syncer: Arc<dyn PolicySyncer>,
    validator: PolicyValidator,
    default_preset: String,
}

impl PolicyService {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        sandboxes: Arc<dyn SandboxDirectory>,
        syncer: Arc<dyn PolicySyncer>,
        config: &PolicyConfig,
    ) -> Self {
        Self {
            store,
            sandboxes,
            syncer,
            validator: PolicyValidator::new(config.strict_catch_all),
            default_preset: config.default_preset.clone(),
        }
    }

    pub fn validator(&self) -> PolicyValidator {
        self.validator
    }

    pub fn validate(&self, draft: &PolicyDraft) -> ValidationReport {
        self.validator.validate(draft)
    }

    /// The stored policy, or the configured default preset when none is stored.
    pub async fn effective_policy(&self, agent_id: &str) -> Result<NetworkPolicy, ToolError> {
        if let Some(policy) = self.store.load_policy(agent_id).await? {
            return Ok(policy);
        }
        preset_policy(&self.default_preset).ok_or_else(|| ToolError::Storage {
            detail: format!("default preset '{}' does not exist", self.default_preset),
        })
    }

    pub async fn check_domain(&self, agent_id: &str, host: &str) -> Result<Decision, ToolError> {
        let policy = self.effective_policy(agent_id).await?;
        Ok(evaluate(&policy, host))
    }

    /// Validate `draft`, store it whole, then push it to the home sandbox.
    ///
    /// A failed push leaves the policy stored and marked pending.
    #[instrument(skip(self, draft), fields(mode = %draft.mode, rules = draft.rules.len()))]
    pub async fn replace_policy(
        &self,
        agent_id: &str,
        draft: &PolicyDraft,
    ) -> Result<ReplaceOutcome, ToolError> {
        let (mut policy, report) = self
            .validator
            .parse(draft)
            .map_err(|report| ToolError::PolicyValidation {
                errors: report.errors,
            })?;

        policy.customized = match policy.preset_id.as_deref() {
            Some(id) => match find_preset(id) {
                Some(preset) => preset.differs_from(&policy),
                None => {
                    return Err(ToolError::PolicyValidation {
                        errors: vec![format!("unknown preset '{id}'")],
                    })
                }
            },
            None => true,
        };

        self.store.replace_policy(agent_id, policy.clone()).await?;
        self.store
            .record_sync(agent_id, PolicySyncStatus::awaiting_push())
            .await?;
        let sync = self.sync(agent_id, &policy).await?;

        Ok(ReplaceOutcome {
            policy,
            warnings: report.warnings,
            sync,
        })
    }

    pub async fn apply_preset(
        &self,
        agent_id: &str,
        preset_id: &str,
    ) -> Result<ReplaceOutcome, ToolError> {
        let policy = preset_policy(preset_id).ok_or_else(|| ToolError::PolicyValidation {
            errors: vec![format!("unknown preset '{preset_id}'")],
        })?;
        self.replace_policy(agent_id, &PolicyDraft::from(&policy)).await
    }

    /// Re-push the stored policy for one agent.
    pub async fn retry_pending_sync(&self, agent_id: &str) -> Result<SyncOutcome, ToolError> {
        let policy = self
            .store
            .load_policy(agent_id)
            .await?
            .ok_or_else(|| ToolError::Storage {
                detail: format!("no policy stored for agent '{agent_id}'"),
            })?;
        self.sync(agent_id, &policy).await
    }

    /// Retry every agent whose policy is still pending, concurrently.
    pub async fn retry_all_pending(
        &self,
    ) -> Result<Vec<(String, Result<SyncOutcome, ToolError>)>, ToolError> {
        let agents = self.store.pending_syncs().await?;
        let results = join_all(agents.iter().map(|a| self.retry_pending_sync(a))).await;
        Ok(agents.into_iter().zip(results).collect())
    }

    async fn sync(&self, agent_id: &str, policy: &NetworkPolicy) -> Result<SyncOutcome, ToolError> {
        let previous = self
            .store
            .load_sync_status(agent_id)
            .await?
            .unwrap_or_else(PolicySyncStatus::awaiting_push);
        let now = Utc::now();

        let pushed = match self.sandboxes.home_sandbox(agent_id).await? {
            Some(home) => {
                let rules = EnforcementRuleSet::compile(policy);
                self.syncer.push(agent_id, &home, &rules).await
            }
            None => Err(SyncError::NoHomeSandbox {
                agent_id: agent_id.to_string(),
            }),
        };

        match pushed {
            Ok(()) => {
                let status = previous.succeeded(now);
                obs::emit_policy_synced(agent_id, status.attempts);
                self.store.record_sync(agent_id, status).await?;
                Ok(SyncOutcome::Synced)
            }
            Err(e) => {
                let status = previous.failed(now, e.to_string());
                obs::emit_policy_sync_failed(agent_id, status.attempts, &e);
                METRICS.inc_policy_sync_failures();
                self.store.record_sync(agent_id, status).await?;
                Ok(SyncOutcome::Pending {
                    error: e.to_string(),
                })
            }
        }
    }
}
