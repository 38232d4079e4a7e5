//! Read-only view of `<data_dir>/registry.json`, the list of agents this
//! host manages. Populated out of band (bootstrap/configure flows); the IPC
//! surface only ever reads it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// spec.md §3's `Agent registry entry` shape verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub agent_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    Archived,
}

pub fn list(path: &Path) -> std::io::Result<Vec<AgentRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes).unwrap_or_default())
}

pub fn get(path: &Path, id: &str) -> std::io::Result<Option<AgentRecord>> {
    Ok(list(path)?.into_iter().find(|a| a.id == id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_registry_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        assert!(list(&path).unwrap().is_empty());
    }

    #[test]
    fn finds_agent_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(
            &path,
            r#"[{"id":"main","name":"Main","status":"active","agentType":"general",
                "capabilities":["chat"],"createdBy":"system",
                "createdAt":"2026-01-01T00:00:00Z","updatedAt":"2026-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let found = get(&path, "main").unwrap().unwrap();
        assert_eq!(found.name, "Main");
        assert_eq!(found.status, AgentStatus::Active);
    }
}
