//! Concurrent stdout/stderr draining for a spawned sandbox process.
//!
//! Sequential draining deadlocks once either pipe's OS buffer fills while
//! the other side is still being read — spec.md §4.13 step 11 and §5 call
//! this out explicitly. `tokio::join!` races two `BufReader::lines()` tasks
//! instead, the natural async generalisation of racing two futures to
//! completion.

use ax_sandbox::SandboxHandle;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Everything collected from one sandbox run: stdout joined into the reply
/// text, and the process's final exit code.
pub struct DrainedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Drains stdout and stderr concurrently, tees stderr lines to the
/// structured logger tagged `[agent:stderr]`, and waits for exit. The
/// caller must have already written and shut down `handle.stdin` before
/// calling this — the agent blocks on stdin EOF before producing output.
pub async fn drain_and_wait(handle: SandboxHandle) -> crate::error::Result<DrainedOutput> {
    let (_stdin, stdout, stderr, waiter) = handle.into_parts();

    let stdout_task = async move {
        let mut reader = BufReader::new(stdout).lines();
        let mut out = String::new();
        while let Ok(Some(line)) = reader.next_line().await {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&line);
        }
        out
    };

    let stderr_task = async move {
        let mut reader = BufReader::new(stderr).lines();
        let mut err = String::new();
        while let Ok(Some(line)) = reader.next_line().await {
            info!(target: "agent", "[agent:stderr] {}", line);
            if !err.is_empty() {
                err.push('\n');
            }
            err.push_str(&line);
        }
        err
    };

    let (stdout_text, stderr_text) = tokio::join!(stdout_task, stderr_task);

    let exit = waiter.wait().await?;

    Ok(DrainedOutput {
        stdout: stdout_text,
        stderr: stderr_text,
        exit_code: exit.code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_sandbox::{SandboxBackend, SandboxConfig, SubprocessBackend};
    use std::path::PathBuf;
    use tokio::io::AsyncWriteExt;

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
    async fn drains_interleaved_stdout_and_stderr_without_deadlock() {
        let backend = SubprocessBackend::new();
        let mut handle = backend
            .spawn(cfg(vec![
                "/bin/sh",
                "-c",
                "echo out-line; echo err-line 1>&2; exit 0",
            ]))
            .await
            .unwrap();
        handle.stdin.shutdown().await.unwrap();

        let result = drain_and_wait(handle).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "out-line");
        assert_eq!(result.stderr, "err-line");
    }
}
