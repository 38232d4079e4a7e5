//! The single JSON object written to the sandboxed agent's stdin before the
//! pipe is closed, per spec.md §6's sandbox stdin payload shape.

use ax_core::types::Profile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStdinPayload {
    pub history: Vec<HistoryEntry>,
    pub message: String,
    pub taint_ratio: f64,
    pub taint_threshold: f64,
    pub profile: Profile,
    pub sandbox_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub reply_optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_camel_case_field_names() {
        // spec.md §6 documents this payload's wire shape with literal
        // camelCase keys (taintRatio, sandboxType, ...) — it's read by
        // agent runtimes outside this workspace, so the external contract
        // wins over the internal snake_case convention. Covered here so a
        // future field rename doesn't silently drift back to snake_case.
        let payload = AgentStdinPayload {
            history: vec![],
            message: "hi".to_string(),
            taint_ratio: 0.0,
            taint_threshold: 0.3,
            profile: Profile::Balanced,
            sandbox_type: "subprocess".to_string(),
            user_id: None,
            reply_optional: false,
            agent_id: None,
            agent_workspace: None,
            user_workspace: None,
            scratch_dir: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"taintRatio\":0.0"));
        assert!(json.contains("\"taintThreshold\":0.3"));
        assert!(json.contains("\"sandboxType\":\"subprocess\""));
        assert!(json.contains("\"replyOptional\":false"));
        assert!(!json.contains("taint_ratio"));
    }
}
