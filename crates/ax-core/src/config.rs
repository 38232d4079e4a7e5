use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::Profile;

pub const DEFAULT_PORT: u16 = 8722;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_SANDBOX_TIMEOUT_SEC: u64 = 120;
pub const DEFAULT_HEARTBEAT_INTERVAL_MIN: u64 = 30;
pub const DEFAULT_HINT_COOLDOWN_SEC: u64 = 3600;
pub const DEFAULT_HINT_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const WORKSPACE_GC_DAYS: i64 = 7;

/// Top-level config (`ax.toml` + `AX_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for AxConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            agent: AgentConfig::default(),
            database: DatabaseConfig::default(),
            sandbox: SandboxConfig::default(),
            ipc: IpcConfig::default(),
            proxy: ProxyConfig::default(),
            scheduler: SchedulerConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default = "default_context_window")]
    pub context_window: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
    #[serde(default = "default_thread_context_turns")]
    pub thread_context_turns: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            profile: Profile::default(),
            context_window: default_context_window(),
            max_turns: default_max_turns(),
            thread_context_turns: default_thread_context_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_queue_db_path")]
    pub queue_path: String,
    #[serde(default = "default_store_db_path")]
    pub store_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            queue_path: default_queue_db_path(),
            store_path: default_store_db_path(),
        }
    }
}

/// Which sandbox backend to spawn agent processes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxKind {
    Subprocess,
    Namespace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub backend: SandboxKind,
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_sec: u64,
    #[serde(default = "default_sandbox_memory_mb")]
    pub memory_mb: u64,
}

impl Default for SandboxKind {
    fn default() -> Self {
        SandboxKind::Subprocess
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxKind::default(),
            timeout_sec: default_sandbox_timeout(),
            memory_mb: default_sandbox_memory_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    #[serde(default = "default_ipc_socket_path")]
    pub socket_path: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: default_ipc_socket_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_socket_dir")]
    pub socket_dir: String,
    #[serde(default = "default_anthropic_base_url")]
    pub upstream_base_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_proxy_socket_dir(),
            upstream_base_url: default_anthropic_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_min: u64,
    #[serde(default = "default_active_hours_start")]
    pub active_hours_start: u32,
    #[serde(default = "default_active_hours_end")]
    pub active_hours_end: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_hint_cooldown")]
    pub hint_cooldown_sec: u64,
    #[serde(default = "default_hint_threshold")]
    pub hint_confidence_threshold: f64,
    #[serde(default = "default_hint_token_budget")]
    pub hint_token_budget: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_min: default_heartbeat_interval(),
            active_hours_start: default_active_hours_start(),
            active_hours_end: default_active_hours_end(),
            timezone: default_timezone(),
            hint_cooldown_sec: default_hint_cooldown(),
            hint_confidence_threshold: default_hint_threshold(),
            hint_token_budget: default_hint_token_budget(),
        }
    }
}

/// Taint/sensitive-action overrides. The literal defaults live in
/// `ax_taint`; this struct only carries operator overrides through config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub sensitive_actions: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_context_window() -> u64 {
    200_000
}
fn default_max_turns() -> u64 {
    200
}
fn default_thread_context_turns() -> u64 {
    10
}
fn default_sandbox_timeout() -> u64 {
    DEFAULT_SANDBOX_TIMEOUT_SEC
}
fn default_sandbox_memory_mb() -> u64 {
    512
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MIN
}
fn default_active_hours_start() -> u32 {
    8
}
fn default_active_hours_end() -> u32 {
    22
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_hint_cooldown() -> u64 {
    DEFAULT_HINT_COOLDOWN_SEC
}
fn default_hint_threshold() -> f64 {
    DEFAULT_HINT_CONFIDENCE_THRESHOLD
}
fn default_hint_token_budget() -> u64 {
    50_000
}

fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.ax")
}
fn default_queue_db_path() -> String {
    format!("{}/queue.db", data_dir())
}
fn default_store_db_path() -> String {
    format!("{}/store.db", data_dir())
}
fn default_ipc_socket_path() -> String {
    format!("{}/ax.sock", data_dir())
}
fn default_proxy_socket_dir() -> String {
    format!("{}/proxy", data_dir())
}

impl AxConfig {
    /// Load config from a TOML file with `AX_*` env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.map(String::from).unwrap_or_else(default_config_path);

        let config: AxConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AX_").split("_"))
            .extract()
            .map_err(|e| crate::error::AxError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn data_dir(&self) -> String {
        data_dir()
    }
}

fn default_config_path() -> String {
    format!("{}/ax.toml", data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_balanced_profile() {
        let cfg = AxConfig::default();
        assert_eq!(cfg.agent.profile, Profile::Balanced);
        assert_eq!(cfg.sandbox.timeout_sec, DEFAULT_SANDBOX_TIMEOUT_SEC);
    }
}
