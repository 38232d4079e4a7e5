use ax_core::types::TurnRole;
use serde::{Deserialize, Serialize};

/// A single persisted conversation turn. Ordered append-only; `prune` keeps
/// only the most recent `maxTurns` per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub sender: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
