//! Scripted implementations of the capability traits
//!
//! `ScriptedSandbox` (exec + files), `ScriptedTransport` (HTTP) and
//! `RecordingSyncer` (policy push). Responses are queued up front and every
//! call is recorded so tests can assert on what the tools sent.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use toolgate_state::SandboxRecord;

use crate::network_policy::{EnforcementRuleSet, PolicySyncer, SyncError};
use crate::sandbox::{ExecOptions, ExecOutput, SandboxCapability, SandboxIoError, SandboxResult};
use crate::secure_http::{HttpTransport, InboundResponse, OutboundRequest, TransportError};
use crate::session::wrap::find_sentinel;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// ScriptedSandbox
// ---------------------------------------------------------------------------

/// One queued answer to `exec_command`.
#[derive(Debug, Clone)]
pub enum ExecScript {
    /// Raw output, returned as is.
    Output(ExecOutput),
    /// Output followed by the sentinel trailer for `cwd`, as a real shell
    /// running the wrapped command would print it.
    Completed {
        stdout: String,
        cwd: String,
        stderr: String,
        exit_code: i32,
    },
    Fail(SandboxIoError),
    /// Never answers.
    Hang,
}

impl ExecScript {
    pub fn completed(stdout: &str, cwd: &str, stderr: &str, exit_code: i32) -> Self {
        Self::Completed {
            stdout: stdout.to_string(),
            cwd: cwd.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    pub fn raw(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        Self::Output(ExecOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration_ms: 5,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub sandbox_id: String,
    pub command: String,
    pub opts: ExecOptions,
}

#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    execs: Mutex<VecDeque<ExecScript>>,
    calls: Mutex<Vec<ExecCall>>,
    files: Mutex<BTreeMap<(String, String), String>>,
    write_failure: Mutex<Option<SandboxIoError>>,
    writes: Mutex<usize>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_exec(&self, script: ExecScript) {
        lock(&self.execs).push_back(script);
    }

    pub fn exec_calls(&self) -> Vec<ExecCall> {
        lock(&self.calls).clone()
    }

    pub fn put_file(&self, sandbox_id: &str, path: &str, content: &str) {
        lock(&self.files).insert((sandbox_id.to_string(), path.to_string()), content.to_string());
    }

    pub fn file(&self, sandbox_id: &str, path: &str) -> Option<String> {
        lock(&self.files)
            .get(&(sandbox_id.to_string(), path.to_string()))
            .cloned()
    }

    /// Make every following `write_file` fail with `error`.
    pub fn fail_writes(&self, error: SandboxIoError) {
        *lock(&self.write_failure) = Some(error);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        *lock(&self.writes)
    }
}

#[async_trait]
impl SandboxCapability for ScriptedSandbox {
    async fn exec_command(
        &self,
        sandbox_id: &str,
        command: &str,
        opts: ExecOptions,
    ) -> SandboxResult<ExecOutput> {
        lock(&self.calls).push(ExecCall {
            sandbox_id: sandbox_id.to_string(),
            command: command.to_string(),
            opts,
        });
        let script = lock(&self.execs).pop_front();
        match script {
            Some(ExecScript::Output(output)) => Ok(output),
            Some(ExecScript::Completed {
                stdout,
                cwd,
                stderr,
                exit_code,
            }) => {
                let stdout = match find_sentinel(command) {
                    Some(sentinel) => format!("{stdout}\n{sentinel}{cwd}\n"),
                    None => stdout,
                };
                Ok(ExecOutput {
                    stdout,
                    stderr,
                    exit_code,
                    duration_ms: 5,
                })
            }
            Some(ExecScript::Fail(err)) => Err(err),
            Some(ExecScript::Hang) => std::future::pending().await,
            None => Err(SandboxIoError::Unavailable {
                sandbox_id: sandbox_id.to_string(),
                reason: "no scripted exec response".to_string(),
            }),
        }
    }

    async fn read_file(&self, sandbox_id: &str, path: &str) -> SandboxResult<String> {
        self.file(sandbox_id, path)
            .ok_or_else(|| SandboxIoError::NotFound {
                path: path.to_string(),
            })
    }

    async fn write_file(&self, sandbox_id: &str, path: &str, content: &str) -> SandboxResult<()> {
        if let Some(err) = lock(&self.write_failure).clone() {
            return Err(err);
        }
        self.put_file(sandbox_id, path, content);
        *lock(&self.writes) += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum TransportScript {
    Respond(InboundResponse),
    Fail(TransportError),
    Hang,
}

impl TransportScript {
    pub fn respond(status: u16, body: &str) -> Self {
        Self::Respond(InboundResponse {
            status,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: body.to_string(),
        })
    }
}

/// Records every outbound request. Secrets end up in the recorded
/// requests, which is the point: tests check interpolation there.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<TransportScript>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: TransportScript) {
        lock(&self.scripts).push_back(script);
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError> {
        lock(&self.requests).push(request);
        let script = lock(&self.scripts).pop_front();
        match script {
            Some(TransportScript::Respond(response)) => Ok(response),
            Some(TransportScript::Fail(err)) => Err(err),
            Some(TransportScript::Hang) => std::future::pending().await,
            None => Err(TransportError::Other("no scripted response".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSyncer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPush {
    pub agent_id: String,
    pub sandbox: String,
    pub rules: EnforcementRuleSet,
}

/// Accepts pushes (or fails them while a failure is set) and records them.
#[derive(Debug, Default)]
pub struct RecordingSyncer {
    pushes: Mutex<Vec<SyncPush>>,
    failure: Mutex<Option<SyncError>>,
}

impl RecordingSyncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, failure: Option<SyncError>) {
        *lock(&self.failure) = failure;
    }

    pub fn pushes(&self) -> Vec<SyncPush> {
        lock(&self.pushes).clone()
    }
}

#[async_trait]
impl PolicySyncer for RecordingSyncer {
    async fn push(
        &self,
        agent_id: &str,
        sandbox: &SandboxRecord,
        rules: &EnforcementRuleSet,
    ) -> Result<(), SyncError> {
        if let Some(err) = lock(&self.failure).clone() {
            return Err(err);
        }
        lock(&self.pushes).push(SyncPush {
            agent_id: agent_id.to_string(),
            sandbox: sandbox.name.clone(),
            rules: rules.clone(),
        });
        Ok(())
    }
}
