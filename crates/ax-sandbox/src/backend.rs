use async_trait::async_trait;

use crate::error::Result;
use crate::types::{SandboxConfig, SandboxExit, SandboxHandle, SandboxWaiter};

/// C10 — uniform contract every sandbox isolation strategy implements.
/// The child may only reach the host through `cfg.ipc_socket` (and, for
/// direct-upstream agents, the proxy socket threaded through the same env);
/// it may only write to `cfg.workspace` and `cfg.scratch_dir`.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    async fn spawn(&self, cfg: SandboxConfig) -> Result<SandboxHandle>;
}

impl SandboxHandle {
    /// Convenience for callers that don't need to drain stdio themselves
    /// (e.g. a one-shot command whose output nobody reads). Prefer
    /// `into_parts` followed by `SandboxWaiter::wait` when stdout/stderr
    /// must be drained concurrently first.
    pub async fn wait(self) -> Result<SandboxExit> {
        let (_, _, _, waiter) = self.into_parts();
        waiter.wait().await
    }
}

impl SandboxWaiter {
    /// Race the child's exit against `timeout_sec`, killing the process tree
    /// on expiry.
    pub async fn wait(mut self) -> Result<SandboxExit> {
        let pid = self.child.id();
        let timeout = std::time::Duration::from_secs(self.timeout_sec);

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => Ok(SandboxExit {
                code: status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => {
                if let Some(raw_pid) = pid {
                    #[cfg(unix)]
                    unsafe {
                        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
                    }
                }
                let _ = self.child.wait().await;
                Err(crate::error::SandboxError::Timeout {
                    ms: self.timeout_sec * 1_000,
                })
            }
        }
    }
}
