//! Dev-only fallback backend: a plain subprocess with a minimal, scoped env
//! and no filesystem/namespace isolation beyond "don't pass it paths it
//! shouldn't have". Grounded on `TerminalManager::exec`'s spawn + timeout +
//! PID-targeted `SIGKILL` shape, generalised from "one-shot capture" to
//! "long-lived child with piped stdio the caller drains itself".

use async_trait::async_trait;
use tracing::warn;

use crate::backend::SandboxBackend;
use crate::env::{build_env, validate_env};
use crate::error::{Result, SandboxError};
use crate::types::{SandboxConfig, SandboxHandle};

pub struct SubprocessBackend;

impl SubprocessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubprocessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxBackend for SubprocessBackend {
    async fn spawn(&self, cfg: SandboxConfig) -> Result<SandboxHandle> {
        warn!("subprocess sandbox backend provides no isolation — dev-only");

        let workspace = cfg.workspace.to_string_lossy().to_string();
        let ipc_socket = cfg.ipc_socket.to_string_lossy().to_string();
        let skills = cfg.skills.to_string_lossy().to_string();
        let agent_dir = cfg.agent_dir.to_string_lossy().to_string();

        let proxy_socket = cfg.proxy_socket.as_ref().map(|p| p.to_string_lossy().to_string());
        let env = build_env(&workspace, &ipc_socket, &skills, &agent_dir, proxy_socket.as_deref());
        validate_env(&env).map_err(SandboxError::Spawn)?;

        let Some((program, args)) = cfg.command.split_first() else {
            return Err(SandboxError::Spawn("empty sandbox command vector".to_string()));
        };

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(&cfg.workspace)
            .env_clear()
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (k, v) in &env {
            command.env(k, v);
        }

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("spawn failed: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| SandboxError::Spawn("no stdin pipe".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| SandboxError::Spawn("no stdout pipe".to_string()))?;
        let stderr = child.stderr.take().ok_or_else(|| SandboxError::Spawn("no stderr pipe".to_string()))?;

        Ok(SandboxHandle {
            child,
            stdin,
            stdout,
            stderr,
            timeout_sec: cfg.timeout_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cfg(command: Vec<&str>) -> SandboxConfig {
        SandboxConfig {
            workspace: PathBuf::from("/tmp"),
            skills: PathBuf::from("/tmp/skills"),
            ipc_socket: PathBuf::from("/tmp/ax.sock"),
            agent_dir: PathBuf::from("/tmp/agent"),
            agent_workspace: None,
            user_workspace: None,
            scratch_dir: PathBuf::from("/tmp/scratch"),
            proxy_socket: None,
            timeout_sec: 5,
            memory_mb: 64,
            command: command.into_iter().map(String::from).collect(),
        }
    }

    #[tokio::test]
    async fn spawns_and_waits_for_echo() {
        let backend = SubprocessBackend::new();
        let handle = backend.spawn(cfg(vec!["/bin/echo", "hi"])).await.unwrap();
        let exit = handle.wait().await.unwrap();
        assert_eq!(exit.code, 0);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let backend = SubprocessBackend::new();
        assert!(backend.spawn(cfg(vec![])).await.is_err());
    }
}
