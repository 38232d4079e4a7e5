//! Shared audit contract. `ax-router` and `ax-ipc` both record through the
//! same `AuditSink` so every policy decision and every IPC mutation lands in
//! one ledger; `ax-host` supplies the concrete (rusqlite-backed) sink.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Blocked,
    Failed,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditResult::Success => "success",
            AuditResult::Blocked => "blocked",
            AuditResult::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One audited event: `{action, sessionId, args, result}` per the error
/// handling design's propagation rule — every policy decision and every
/// mutation is audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub session_id: String,
    pub args: serde_json::Value,
    pub result: AuditResult,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, session_id: impl Into<String>, args: serde_json::Value, result: AuditResult) -> Self {
        Self {
            action: action.into(),
            session_id: session_id.into(),
            args,
            result,
        }
    }
}

/// Storage-agnostic audit sink. Implementations must not block the caller
/// for long — `ax-host`'s rusqlite-backed sink is a single `INSERT` under a
/// mutex, matching the other durable-store crates' single-writer pattern.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// No-op sink for tests and standalone component exercises.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Optional companion to `AuditSink` for sinks that can also answer
/// `audit_query`. Kept separate from `AuditSink` because most call sites
/// (the router, most IPC handlers) only ever record and never need to read
/// the ledger back.
pub trait AuditQuery: Send + Sync {
    fn query(&self, session_id: Option<&str>, limit: u64) -> Vec<AuditEvent>;
}
