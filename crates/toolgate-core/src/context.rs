//! Per-call execution context handed to the dispatcher by the agent loop.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EditMode;

/// Opaque handle to a persistent remote shell.
///
/// Owned by the caller. The driver passes it through to the sandbox
/// capability and never stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a tool needs to know about who is calling and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Machine id of the sandbox commands run in (normally the home sandbox).
    pub sandbox_id: String,
    pub cwd: String,
    #[serde(default)]
    pub session: Option<SessionHandle>,
    pub agent_id: String,
    pub run_id: String,
    /// Overrides `edit.default_mode` for this run.
    #[serde(default)]
    pub edit_mode: Option<EditMode>,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    /// Plugin or channel the run's output is delivered to.
    #[serde(default)]
    pub delivery_target: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        agent_id: impl Into<String>,
        run_id: impl Into<String>,
        sandbox_id: impl Into<String>,
        cwd: impl Into<String>,
    ) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            cwd: cwd.into(),
            session: None,
            agent_id: agent_id.into(),
            run_id: run_id.into(),
            edit_mode: None,
            skills: BTreeSet::new(),
            delivery_target: None,
        }
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_edit_mode(mut self, mode: EditMode) -> Self {
        self.edit_mode = Some(mode);
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.insert(skill.into());
        self
    }

    pub fn with_delivery_target(mut self, target: impl Into<String>) -> Self {
        self.delivery_target = Some(target.into());
        self
    }
}
