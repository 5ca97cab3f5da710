//! toolgate-state: persistence for the toolgate tool layer
//!
//! ## Layer 0 - Data/Persistence
//!
//! Holds the record types the tool layer reads (credentials, network
//! policies, sandbox records) and the keyed-store traits it consumes. The
//! tool layer never mutates credentials; policies are replaced whole.
//!
//! ## Key Components
//!
//! - `CredentialVault`, `PolicyStore`, `SandboxDirectory`: storage traits
//! - `fakes`: in-memory implementations
//! - `SurrealPolicyStore`: SurrealDB-backed policy storage

mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_policy_store;

pub use error::{StateError, StorageError};
pub use schema::{
    Credential, CredentialSummary, NetworkPolicy, PolicyMode, PolicyRule, PolicySyncStatus,
    RuleAction, SandboxKind, SandboxRecord, Secret,
};
pub use storage_traits::{CredentialVault, PolicyStore, SandboxDirectory, StorageResult};
pub use surreal_policy_store::{CloudConfig, SurrealPolicyStore};

/// Result type for toolgate-state connection/setup operations
pub type Result<T> = std::result::Result<T, StateError>;
