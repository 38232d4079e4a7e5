use ax_scanner::Verdict;
use serde::{Deserialize, Serialize};

/// Result of `Router::process_inbound`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundResult {
    pub queued: bool,
    pub message_id: Option<String>,
    pub session_id: String,
    pub canary_token: String,
    pub scan_result: ScanSummary,
}

/// Result of `Router::process_outbound`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundResult {
    pub content: String,
    pub scan_result: ScanSummary,
    pub canary_leaked: bool,
}

/// Wire-friendly mirror of `ax_scanner::Verdict` (the scanner crate has no
/// serde dependency, so the router owns the serialisable shape it audits
/// and returns over IPC/HTTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub verdict: &'static str,
    pub reason: Option<String>,
}

impl From<Verdict> for ScanSummary {
    fn from(v: Verdict) -> Self {
        let verdict = match v.level {
            ax_scanner::VerdictLevel::Pass => "pass",
            ax_scanner::VerdictLevel::Flag => "flag",
            ax_scanner::VerdictLevel::Block => "block",
        };
        Self { verdict, reason: v.reason }
    }
}

/// Fixed body substituted for a reply that leaked the canary token.
pub const CANARY_LEAK_NOTICE: &str =
    "This response was withheld because it echoed protected content.";
