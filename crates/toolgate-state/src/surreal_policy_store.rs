//! SurrealDB-backed PolicyStore implementation
//!
//! Policies are stored as whole JSON documents keyed by agent id, matching
//! the replace-whole-policy contract of [`PolicyStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{surreal_datetime, surreal_datetime_opt, NetworkPolicy, PolicySyncStatus};
use crate::storage_traits::{PolicyStore, StorageResult};

const NAMESPACE: &str = "toolgate";
const DATABASE: &str = "main";

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "toolgate")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| NAMESPACE.to_string());
        let database = std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbPolicyRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<surrealdb::sql::Thing>,
    agent_id: String,
    policy_json: String,
    #[serde(with = "surreal_datetime")]
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbSyncRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<surrealdb::sql::Thing>,
    agent_id: String,
    pending: bool,
    attempts: u32,
    #[serde(default, with = "surreal_datetime_opt")]
    last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl DbSyncRow {
    fn from_status(agent_id: &str, status: PolicySyncStatus) -> Self {
        Self {
            id: None,
            agent_id: agent_id.to_string(),
            pending: status.pending,
            attempts: status.attempts,
            last_attempt_at: status.last_attempt_at,
            last_success_at: status.last_success_at,
            last_error: status.last_error,
        }
    }

    fn into_status(self) -> PolicySyncStatus {
        PolicySyncStatus {
            pending: self.pending,
            attempts: self.attempts,
            last_attempt_at: self.last_attempt_at,
            last_success_at: self.last_success_at,
            last_error: self.last_error,
        }
    }
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`PolicyStore`].
pub struct SurrealPolicyStore {
    db: Surreal<Any>,
}

impl SurrealPolicyStore {
    /// Connect to `mem://` and initialize the schema. Used by tests and the CLI's
    /// ephemeral mode.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect_url("mem://").await
    }

    /// Connect to an arbitrary SurrealDB URL (`mem://`, `surrealkv://path`, `ws://...`).
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect_url(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealPolicyStore connected");
        Ok(Self { db })
    }

    /// Connect to a remote instance with credentials.
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace))]
    pub async fn connect_cloud(config: CloudConfig) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealPolicyStore connected (cloud)");
        Ok(Self { db })
    }

    /// Connect using environment variables.
    ///
    /// Cloud credentials win, then `SURREALDB_URL`, then local persistence in
    /// `.toolgate/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            return Self::connect_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect_url(&url).await;
        }

        let path = ".toolgate/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        info!("No cloud config or SURREALDB_URL found, using local persistence");
        Self::connect_url(&format!("surrealkv://{path}")).await
    }
}

#[async_trait]
impl PolicyStore for SurrealPolicyStore {
    async fn load_policy(&self, agent_id: &str) -> StorageResult<Option<NetworkPolicy>> {
        let aid = agent_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM network_policies WHERE agent_id = $aid")
            .bind(("aid", aid))
            .await
            .map_err(backend)?;

        let rows: Vec<DbPolicyRow> = res.take(0).map_err(backend)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_str(&row.policy_json)?)),
            None => Ok(None),
        }
    }

    async fn replace_policy(&self, agent_id: &str, policy: NetworkPolicy) -> StorageResult<()> {
        let row = DbPolicyRow {
            id: None,
            agent_id: agent_id.to_string(),
            policy_json: serde_json::to_string(&policy)?,
            updated_at: Utc::now(),
        };
        debug!(agent_id = %agent_id, rules = policy.rules.len(), "replacing network policy");

        self.db
            .query("BEGIN TRANSACTION; DELETE network_policies WHERE agent_id = $aid; CREATE network_policies CONTENT $row; COMMIT TRANSACTION;")
            .bind(("aid", agent_id.to_string()))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        Ok(())
    }

    async fn record_sync(&self, agent_id: &str, status: PolicySyncStatus) -> StorageResult<()> {
        let row = DbSyncRow::from_status(agent_id, status);

        self.db
            .query("BEGIN TRANSACTION; DELETE policy_sync WHERE agent_id = $aid; CREATE policy_sync CONTENT $row; COMMIT TRANSACTION;")
            .bind(("aid", agent_id.to_string()))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        Ok(())
    }

    async fn load_sync_status(&self, agent_id: &str) -> StorageResult<Option<PolicySyncStatus>> {
        let aid = agent_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM policy_sync WHERE agent_id = $aid")
            .bind(("aid", aid))
            .await
            .map_err(backend)?;

        let rows: Vec<DbSyncRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(DbSyncRow::into_status))
    }

    async fn pending_syncs(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query("SELECT * FROM policy_sync WHERE pending = true ORDER BY agent_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<DbSyncRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(|r| r.agent_id).collect())
    }
}
