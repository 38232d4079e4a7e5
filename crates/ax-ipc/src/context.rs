use std::path::PathBuf;

use ax_core::types::Profile;

/// Per-request identity. Built by the server from the authenticated
/// connection (one sandboxed agent process per Unix socket connection) and
/// threaded through every handler — nothing in the handler layer ever trusts
/// a session/agent id supplied inside the request body itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub agent_id: String,
    pub user_id: Option<String>,
    pub profile: Profile,
    pub data_dir: PathBuf,
}

impl RequestContext {
    pub fn agent_dir(&self) -> PathBuf {
        self.data_dir.join("agents").join(&self.agent_id)
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.data_dir.join("skills")
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.data_dir.join("proposals")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    /// Resolves a workspace tier to a directory. `agent` is the agent's own
    /// persistent workspace; `user` is scoped under the caller's user id
    /// (falling back to the session id for DM-less sessions); `scratch` is
    /// per-session and expected to be GC'd with the rest of the session
    /// workspace.
    pub fn workspace_dir(&self, tier: &str) -> PathBuf {
        match tier {
            "agent" => self.agent_dir().join("workspace"),
            "user" => {
                let user = self.user_id.as_deref().unwrap_or(&self.session_id);
                self.agent_dir().join("users").join(user).join("workspace")
            }
            "scratch" => self.data_dir.join("workspaces").join(&self.session_id).join("scratch"),
            other => self.data_dir.join("workspaces").join(&self.session_id).join(other),
        }
    }
}
