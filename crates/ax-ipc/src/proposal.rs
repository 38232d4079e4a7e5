//! Identity/skill change proposals, persisted one JSON file per proposal
//! under `<data_dir>/proposals/<id>.json` per the on-disk layout spec.
//! File-per-record instead of SQLite here: proposals are low-volume,
//! human-reviewed, and benefit from being individually inspectable/editable
//! on disk the way the agent's identity files already are.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    /// "identity_write" or "skill_propose".
    pub kind: String,
    /// The file/name the change targets (e.g. "SOUL.md", a skill name).
    pub target: String,
    pub content: String,
    pub reason: Option<String>,
    pub origin: String,
    pub taint_ratio: Option<f64>,
    pub status: ProposalStatus,
    /// spec.md §3's `createdBy` — the session/user that triggered this
    /// proposal, or "agent" when the agent itself initiated it with no
    /// user in the loop.
    pub created_by: String,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl Proposal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: &str,
        target: &str,
        content: &str,
        reason: Option<String>,
        origin: &str,
        taint_ratio: Option<f64>,
        created_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            target: target.to_string(),
            content: content.to_string(),
            reason,
            origin: origin.to_string(),
            taint_ratio,
            status: ProposalStatus::Pending,
            created_by: created_by.to_string(),
            created_at: Utc::now().to_rfc3339(),
            decided_at: None,
        }
    }
}

pub fn save(dir: &Path, proposal: &Proposal) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", proposal.id));
    fs::write(path, serde_json::to_vec_pretty(proposal)?)
}

pub fn list(dir: &Path) -> std::io::Result<Vec<Proposal>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(bytes) = fs::read(entry.path()) {
            if let Ok(p) = serde_json::from_slice::<Proposal>(&bytes) {
                out.push(p);
            }
        }
    }
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(out)
}

pub fn get(dir: &Path, id: &str) -> std::io::Result<Option<Proposal>> {
    let path = dir.join(format!("{id}.json"));
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes).ok())
}

pub fn set_status(dir: &Path, id: &str, status: ProposalStatus) -> std::io::Result<Option<Proposal>> {
    let Some(mut p) = get(dir, id)? else { return Ok(None) };
    p.status = status;
    p.decided_at = Some(Utc::now().to_rfc3339());
    save(dir, &p)?;
    Ok(Some(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_list_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = Proposal::new("identity_write", "SOUL.md", "new soul", None, "agent_initiated", Some(0.2), "agent");
        save(dir.path(), &p).unwrap();

        let listed = list(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, p.id);

        let fetched = get(dir.path(), &p.id).unwrap().unwrap();
        assert_eq!(fetched.target, "SOUL.md");
    }

    #[test]
    fn set_status_persists_decision() {
        let dir = tempfile::tempdir().unwrap();
        let p = Proposal::new("skill_propose", "weather", "content", None, "user_request", None, "u1");
        save(dir.path(), &p).unwrap();

        let updated = set_status(dir.path(), &p.id, ProposalStatus::Approved).unwrap().unwrap();
        assert_eq!(updated.status, ProposalStatus::Approved);
        assert!(updated.decided_at.is_some());
    }

    #[test]
    fn missing_proposal_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(get(dir.path(), "nope").unwrap().is_none());
    }
}
