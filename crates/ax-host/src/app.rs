//! Central host wiring. Builds every component named in spec.md §2 once at
//! startup and shares it behind `Arc`s — the single host value the design
//! notes call for in place of the source's module-level singletons.

use std::path::PathBuf;
use std::sync::Arc;

use ax_core::audit::AuditSink;
use ax_core::config::AxConfig;
use ax_pipeline::{CompletionPipeline, PipelineConfig};
use ax_proxy::AuthMode;
use ax_queue::QueueManager;
use ax_router::Router;
use ax_sandbox::{NamespaceBackend, SandboxBackend, SubprocessBackend};
use ax_store::{AuditStore, ConversationStore};
use ax_taint::TaintBudget;
use tracing::warn;

/// Everything the HTTP surface and the IPC server need, built once in
/// [`AppState::build`] from [`AxConfig`] and shared for the life of the
/// process.
pub struct AppState {
    pub config: AxConfig,
    pub pipeline: Arc<CompletionPipeline>,
    pub queue: Arc<QueueManager>,
    pub store: Arc<ConversationStore>,
    pub taint: Arc<TaintBudget>,
    pub router: Arc<Router>,
    pub audit: Arc<AuditStore>,
    pub data_dir: PathBuf,
    pub ipc_socket: PathBuf,
}

pub fn resolve_auth_mode() -> AuthMode {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        return AuthMode::ApiKey(key);
    }
    if std::env::var(ax_creds::ACCESS_TOKEN_VAR).is_ok() {
        return AuthMode::OAuth;
    }
    warn!("no upstream credentials found in the environment at startup — completions requiring direct upstream access will fail fast");
    AuthMode::OAuth
}

impl AppState {
    pub fn build(config: AxConfig) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(config.data_dir());
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(data_dir.join("workspaces"))?;
        std::fs::create_dir_all(data_dir.join("skills"))?;
        std::fs::create_dir_all(data_dir.join("agents").join("default"))?;
        std::fs::create_dir_all(data_dir.join(&config.proxy.socket_dir))?;

        let queue = Arc::new(QueueManager::open(&config.database.queue_path)?);
        let store = Arc::new(ConversationStore::open(&config.database.store_path)?);
        let taint = Arc::new(TaintBudget::new());
        let audit_path = data_dir.join("audit.db");
        let audit = Arc::new(AuditStore::open(audit_path.to_str().expect("utf8 data dir"))?);
        let router = Arc::new(Router::new(Arc::clone(&taint), Arc::clone(&queue), Arc::clone(&audit) as Arc<dyn AuditSink>));

        let sandbox: Arc<dyn SandboxBackend> = match config.sandbox.backend {
            ax_core::config::SandboxKind::Subprocess => Arc::new(SubprocessBackend::new()),
            ax_core::config::SandboxKind::Namespace => Arc::new(NamespaceBackend::new()),
        };

        let auth = resolve_auth_mode();
        let creds = Arc::new(ax_creds::CredsRefresher::new(
            format!("{}/oauth/token", config.proxy.upstream_base_url),
            "ax-host",
            data_dir.join(".env"),
        ));

        let pipeline_config = PipelineConfig {
            data_dir: data_dir.clone(),
            host_skills_dir: data_dir.join("skills"),
            proxy_socket_dir: data_dir.join(&config.proxy.socket_dir),
            sandbox_command: vec!["ax-agent".to_string()],
            sandbox_timeout_sec: config.sandbox.timeout_sec,
            sandbox_memory_mb: config.sandbox.memory_mb,
            context_window: config.agent.context_window,
            max_turns: config.agent.max_turns,
            thread_context_turns: config.agent.thread_context_turns,
            model: config.agent.model.clone(),
            upstream_base_url: config.proxy.upstream_base_url.clone(),
        };

        let pipeline = Arc::new(CompletionPipeline::new(
            pipeline_config,
            Arc::clone(&router),
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&taint),
            sandbox,
            creds,
            auth,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            None,
        ));

        let ipc_socket = PathBuf::from(&config.ipc.socket_path);

        Ok(Self {
            config,
            pipeline,
            queue,
            store,
            taint,
            router,
            audit,
            data_dir,
            ipc_socket,
        })
    }
}

/// Assemble the full Axum router — spec.md §6's HTTP API surface.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route("/v1/chat/completions", axum::routing::post(crate::http::chat::chat_completions))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
