//! SurrealDB schema migrations and initialization
//!
//! Sets up the tables backing [`crate::SurrealPolicyStore`]. Safe to call on
//! every connection: `DEFINE ... ` statements are idempotent.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all toolgate tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing toolgate SurrealDB schema");

    init_policies_table(db).await?;
    init_policy_sync_table(db).await?;

    info!("toolgate schema initialization complete");
    Ok(())
}

/// Initialize `network_policies` table
///
/// Schema:
/// ```text
/// TABLE network_policies {
///   agent_id:    STRING (unique)
///   policy_json: STRING (whole NetworkPolicy document)
///   updated_at:  DATETIME
/// }
/// ```
///
/// The policy is stored as one serialized document because it is only ever
/// replaced as a whole.
async fn init_policies_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing network_policies table");

    let sql = r#"
        DEFINE TABLE network_policies AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_policy_agent ON TABLE network_policies COLUMNS agent_id UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    debug!("network_policies table initialized");
    Ok(())
}

/// Initialize `policy_sync` table
///
/// Schema:
/// ```text
/// TABLE policy_sync {
///   agent_id:        STRING (unique)
///   pending:         BOOL (indexed)
///   attempts:        INT
///   last_attempt_at: DATETIME?
///   last_success_at: DATETIME?
///   last_error:      STRING?
/// }
/// ```
async fn init_policy_sync_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing policy_sync table");

    let sql = r#"
        DEFINE TABLE policy_sync AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_sync_agent ON TABLE policy_sync COLUMNS agent_id UNIQUE;
        DEFINE INDEX idx_sync_pending ON TABLE policy_sync COLUMNS pending;
    "#;

    db.query(sql).await?.check()?;
    debug!("policy_sync table initialized");
    Ok(())
}
