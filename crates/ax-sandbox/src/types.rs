//! Config and handle shapes shared by every `SandboxBackend`.

use std::path::PathBuf;

/// Configuration for one sandboxed agent invocation. Built fresh by the
/// completion pipeline for every completion — never reused across sessions.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Per-completion workspace root. Becomes the child's `HOME`.
    pub workspace: PathBuf,
    /// Host skills directory, refreshed into `<workspace>/skills` before spawn.
    pub skills: PathBuf,
    /// IPC socket path, exposed to the child as `AX_IPC_SOCKET`.
    pub ipc_socket: PathBuf,
    /// Agent identity directory, mounted/exposed read-only.
    pub agent_dir: PathBuf,
    pub agent_workspace: Option<PathBuf>,
    pub user_workspace: Option<PathBuf>,
    /// Per-session scratch directory, writable.
    pub scratch_dir: PathBuf,
    /// Set only for agent types that talk to the upstream model directly
    /// rather than over the IPC socket's `llm_call` action (C13 step 8).
    pub proxy_socket: Option<PathBuf>,
    pub timeout_sec: u64,
    pub memory_mb: u64,
    /// Full argv of the agent command, e.g. `["claude-agent", "--stdin-json"]`.
    pub command: Vec<String>,
}

/// A live sandboxed child. The completion pipeline writes a single JSON
/// payload to `stdin`, closes it, then drains `stdout`/`stderr` concurrently
/// before calling `wait`.
pub struct SandboxHandle {
    pub(crate) child: tokio::process::Child,
    pub stdin: tokio::process::ChildStdin,
    pub stdout: tokio::process::ChildStdout,
    pub stderr: tokio::process::ChildStderr,
    pub(crate) timeout_sec: u64,
}

impl SandboxHandle {
    /// Splits the handle into its piped stdio and a standalone waiter, so a
    /// caller can drain stdout/stderr concurrently and only then await exit
    /// — taking all four fields out at once avoids the partial-move trap of
    /// pulling `stdout`/`stderr` out individually and then trying to call a
    /// method that needs the whole struct back.
    pub fn into_parts(
        self,
    ) -> (
        tokio::process::ChildStdin,
        tokio::process::ChildStdout,
        tokio::process::ChildStderr,
        SandboxWaiter,
    ) {
        (
            self.stdin,
            self.stdout,
            self.stderr,
            SandboxWaiter {
                child: self.child,
                timeout_sec: self.timeout_sec,
            },
        )
    }
}

/// The remainder of a `SandboxHandle` once its stdio has been taken out —
/// owns just the child process and its timeout.
pub struct SandboxWaiter {
    pub(crate) child: tokio::process::Child,
    pub(crate) timeout_sec: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SandboxExit {
    pub code: i32,
}

/// Env vars ever permitted in a sandboxed child's environment. No credential
/// variable may appear here regardless of backend.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "AX_IPC_SOCKET",
    "AX_WORKSPACE",
    "AX_SKILLS",
    "AX_AGENT_DIR",
    "AX_PROXY_SOCKET",
];
