//! Audit trail for credential-bearing requests.
//!
//! One record per `secure_http_request` attempt that names an alias,
//! whether it was sent or rejected. Records never carry secret material.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::obs;
use crate::result::ToolErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "kind", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The request went out and a response came back.
    Sent,
    /// Refused before anything left the process.
    Rejected(ToolErrorKind),
    /// Sent (or attempted) but the transport failed.
    Failed(ToolErrorKind),
}

impl AuditOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub agent_id: String,
    pub run_id: String,
    pub alias: String,
    /// Empty when the URL could not be parsed.
    pub host: String,
    pub method: String,
    #[serde(flatten)]
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Writes audit records to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        obs::emit_credential_request(
            &record.run_id,
            &record.alias,
            &record.host,
            record.outcome.label(),
        );
        tracing::info!(
            target: "toolgate::audit",
            agent_id = %record.agent_id,
            run_id = %record.run_id,
            alias = %record.alias,
            host = %record.host,
            method = %record.method,
            outcome = record.outcome.label(),
            error_kind = match record.outcome {
                AuditOutcome::Sent => "none",
                AuditOutcome::Rejected(k) | AuditOutcome::Failed(k) => k.as_str(),
            },
            status = record.status.unwrap_or(0),
            "credential request audited"
        );
    }
}

/// Keeps records in memory; for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: AuditOutcome) -> AuditRecord {
        AuditRecord {
            agent_id: "agent".into(),
            run_id: "run".into(),
            alias: "github".into(),
            host: "api.github.com".into(),
            method: "GET".into(),
            outcome,
            status: Some(200),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_sink_keeps_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(record(AuditOutcome::Sent)).await;
        sink.record(record(AuditOutcome::Rejected(ToolErrorKind::HostNotAllowed)))
            .await;
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].outcome,
            AuditOutcome::Rejected(ToolErrorKind::HostNotAllowed)
        );
    }

    #[test]
    fn record_serializes_flat_outcome() {
        let json =
            serde_json::to_value(record(AuditOutcome::Failed(ToolErrorKind::RequestTimedOut))).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "RequestTimedOut");
        assert_eq!(json["agentId"], "agent");
    }

    #[tokio::test]
    async fn tracing_sink_accepts_records() {
        TracingAuditSink.record(record(AuditOutcome::Sent)).await;
    }
}
