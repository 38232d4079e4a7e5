//! Shared env-scoping helper every `SandboxBackend` must route its child
//! environment through. Encodes the spec.md §8 invariant directly: the
//! child's env contains only the allowed set, and nothing matching a
//! credential-shaped variable name ever appears.

use std::collections::HashMap;

use crate::types::ALLOWED_ENV_VARS;

const CREDENTIAL_NAME_FRAGMENTS: &[&str] = &[
    "API_KEY",
    "OAUTH",
    "TOKEN",
    "TAVILY",
    "SLACK",
    "SECRET",
    "PASSPHRASE",
    "CREDS",
];

/// Build the exact env map a sandboxed child is allowed to see.
/// `proxy_socket` is only present when this completion's agent type needs
/// direct upstream access (C13 step 8) — it names a local UDS path, not a
/// credential, so it's safe alongside `AX_IPC_SOCKET`.
pub fn build_env(
    workspace: &str,
    ipc_socket: &str,
    skills: &str,
    agent_dir: &str,
    proxy_socket: Option<&str>,
) -> HashMap<&'static str, String> {
    let mut env = HashMap::new();
    env.insert("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()));
    env.insert("HOME", workspace.to_string());
    env.insert("AX_IPC_SOCKET", ipc_socket.to_string());
    env.insert("AX_WORKSPACE", workspace.to_string());
    env.insert("AX_SKILLS", skills.to_string());
    env.insert("AX_AGENT_DIR", agent_dir.to_string());
    if let Some(proxy_socket) = proxy_socket {
        env.insert("AX_PROXY_SOCKET", proxy_socket.to_string());
    }
    env
}

/// Asserts the spec.md §8 sandbox-isolation invariant: only the allowed keys
/// are present, and no value's key matches a known credential pattern.
pub fn validate_env(env: &HashMap<&'static str, String>) -> Result<(), String> {
    for key in env.keys() {
        if !ALLOWED_ENV_VARS.contains(key) {
            return Err(format!("disallowed env var in sandbox child: {key}"));
        }
    }
    for fragment in CREDENTIAL_NAME_FRAGMENTS {
        if env.keys().any(|k| k.contains(fragment)) {
            return Err(format!("credential-shaped env var leaked into sandbox: {fragment}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_env_contains_only_allowed_keys() {
        let env = build_env("/ws", "/sock", "/skills", "/agent", None);
        assert!(validate_env(&env).is_ok());
        assert_eq!(env.len(), ALLOWED_ENV_VARS.len() - 1);
    }

    #[test]
    fn proxy_socket_is_included_only_when_present() {
        let env = build_env("/ws", "/sock", "/skills", "/agent", Some("/proxy.sock"));
        assert!(validate_env(&env).is_ok());
        assert_eq!(env.get("AX_PROXY_SOCKET").map(String::as_str), Some("/proxy.sock"));
    }

    #[test]
    fn credential_shaped_key_is_rejected() {
        let mut env = build_env("/ws", "/sock", "/skills", "/agent", None);
        env.insert("ANTHROPIC_API_KEY", "sk-fake".to_string());
        assert!(validate_env(&env).is_err());
    }
}
