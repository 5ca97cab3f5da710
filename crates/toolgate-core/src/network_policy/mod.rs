//! Domain policy engine: per-agent network access control.
//!
//! A [`NetworkPolicy`](toolgate_state::NetworkPolicy) is an ordered rule list
//! plus a mode. Evaluation is first-match-wins; hosts no rule matches fall
//! back to the mode's default. Policies are replaced whole, validated first,
//! and compiled into an [`EnforcementRuleSet`] that is pushed to the agent's
//! home sandbox.
//!
//! # Modules
//!
//! - [`pattern`]: `DomainPattern`, `is_valid_pattern`, host normalization
//! - [`engine`]: `evaluate()` and `Decision`
//! - [`validation`]: `PolicyDraft`, `PolicyValidator`, `ValidationReport`
//! - [`presets`]: built-in versioned presets
//! - [`enforcement`]: `EnforcementRuleSet` compilation
//! - [`sync`]: `PolicySyncer` and the sandbox-file implementation
//! - [`service`]: `PolicyService` (validate, store, sync, retry)

pub mod engine;
pub mod enforcement;
pub mod pattern;
pub mod presets;
pub mod service;
pub mod sync;
pub mod validation;

pub use engine::{default_action, evaluate, Decision};
pub use enforcement::{EnforcementRule, EnforcementRuleSet};
pub use pattern::{is_valid_pattern, normalize_host, DomainPattern};
pub use presets::{find_preset, preset_policy, presets, PolicyPreset};
pub use service::{PolicyService, ReplaceOutcome, SyncOutcome};
pub use sync::{PolicySyncer, SandboxFileSyncer, SyncError};
pub use validation::{PolicyDraft, PolicyValidator, RuleDraft, ValidationReport};
