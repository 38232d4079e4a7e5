use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod app;
mod http;

/// AX — a security-first personal AI-agent host.
#[derive(Parser)]
#[command(name = "ax-host", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the host: HTTP API, IPC server, and scheduler. Default if no
    /// subcommand is given.
    Serve,
    /// Send a one-shot message to a running instance's HTTP API.
    Send {
        message: String,
        #[arg(long, default_value = "http://127.0.0.1:8722")]
        host: String,
    },
    /// Print where to edit configuration. The interactive wizard is out of
    /// scope for this host (spec.md §1) — this is a thin stub.
    Configure,
    /// Create the data directory layout and a default ax.toml if absent.
    Bootstrap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ax_host=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Send { message, host } => send(&message, &host).await,
        Command::Configure => configure(),
        Command::Bootstrap => bootstrap(),
    };

    if let Err(e) = &result {
        eprintln!("{e}");
        std::process::exit(1);
    }
    result
}

async fn serve() -> anyhow::Result<()> {
    let config_path = std::env::var("AX_CONFIG").ok();
    let config = ax_core::config::AxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        ax_core::config::AxConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::build(config)?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // IPC server (C9) — the sole channel sandboxed agents use to reach the host.
    let ipc_services = Arc::new(ax_ipc::IpcServices {
        data_dir: state.data_dir.clone(),
        taint: Arc::clone(&state.taint),
        memory: Arc::new(ax_store::MemoryStore::open(
            state.data_dir.join("memory.db").to_str().expect("utf8 data dir"),
        )?),
        conversation: Arc::clone(&state.store),
        scheduler: Arc::new(ax_scheduler::SchedulerHandle::new(rusqlite::Connection::open(
            state.data_dir.join("scheduler.db"),
        )?)?),
        audit: Arc::clone(&state.audit) as Arc<dyn ax_core::audit::AuditSink>,
        audit_query: Arc::clone(&state.audit) as Arc<dyn ax_core::audit::AuditQuery>,
        upstream_base_url: state.config.proxy.upstream_base_url.clone(),
        auth: app::resolve_auth_mode(),
        creds: Arc::new(ax_creds::CredsRefresher::new(
            format!("{}/oauth/token", state.config.proxy.upstream_base_url),
            "ax-host",
            state.data_dir.join(".env"),
        )),
    });
    let ipc_socket = state.ipc_socket.clone();
    let ipc_shutdown = shutdown_rx.clone();
    let ipc_task = tokio::spawn(async move {
        let ctx_factory = || {
            ax_ipc::current().unwrap_or_else(|| ax_ipc::RequestContext {
                session_id: "unknown".to_string(),
                agent_id: "default".to_string(),
                user_id: None,
                profile: ax_core::types::Profile::Balanced,
                data_dir: std::path::PathBuf::from("."),
            })
        };
        if let Err(e) = ax_ipc::server::serve(&ipc_socket, ctx_factory, ipc_services, ipc_shutdown).await {
            warn!(error = %e, "ipc server exited with an error");
        }
    });

    // Scheduler (C12) — cron matcher, one-shot timers, heartbeat, proactive hints.
    let scheduler_conn = rusqlite::Connection::open(state.data_dir.join("scheduler.db"))?;
    let (fired_tx, mut fired_rx) = tokio::sync::mpsc::channel(32);
    let scheduler_engine = ax_scheduler::SchedulerEngine::new(scheduler_conn, Some(fired_tx))?;
    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_task = tokio::spawn(scheduler_engine.run(scheduler_shutdown));

    let fired_state = Arc::clone(&state);
    let fired_task = tokio::spawn(async move {
        while let Some(job) = fired_rx.recv().await {
            info!(job_id = %job.id, job_name = %job.name, "scheduler job fired");
            let session = ax_core::types::SessionAddress::new("system", ax_core::types::AddressScope::System)
                .with_identifier("job", job.id.clone());
            let inbound = ax_core::types::InboundMessage::new(session.clone(), "scheduler", job.action.clone());
            let request = ax_pipeline::CompletionRequest {
                inbound: ax_pipeline::InboundSource::Raw(inbound),
                session: ax_pipeline::SessionKind::Persistent(session),
                user_id: None,
                agent_id: None,
                reply_optional: true,
                needs_direct_upstream: false,
                profile: fired_state.config.agent.profile,
            };
            if let Err(e) = fired_state.pipeline.run(request).await {
                warn!(error = %e, job_id = %job.id, "scheduled completion failed");
            }
        }
    });

    // Heartbeat (C12): periodic check-in gated on the configured active
    // hours, dispatched through the same completion pipeline as any other
    // inbound. No concrete "overdue checks" provider ships in this host
    // (out of scope per spec.md §1's memory-provider boundary), so the
    // closure reports none.
    let heartbeat_state = Arc::clone(&state);
    let heartbeat_shutdown = shutdown_rx.clone();
    let heartbeat_agent_dir = state.data_dir.join("agents").join("default");
    let heartbeat_config = heartbeat_state.config.scheduler.clone();
    let heartbeat_task = tokio::spawn(ax_scheduler::heartbeat::run(
        heartbeat_config,
        heartbeat_agent_dir,
        Vec::new,
        move |content| {
            let state = Arc::clone(&heartbeat_state);
            async move {
                let session = ax_core::types::SessionAddress::new("system", ax_core::types::AddressScope::System)
                    .with_identifier("kind", "heartbeat");
                let inbound = ax_core::types::InboundMessage::new(session.clone(), "scheduler", content);
                let request = ax_pipeline::CompletionRequest {
                    inbound: ax_pipeline::InboundSource::Raw(inbound),
                    session: ax_pipeline::SessionKind::Persistent(session),
                    user_id: None,
                    agent_id: None,
                    reply_optional: true,
                    needs_direct_upstream: false,
                    profile: state.config.agent.profile,
                };
                if let Err(e) = state.pipeline.run(request).await {
                    warn!(error = %e, "heartbeat completion failed");
                }
            }
        },
        heartbeat_shutdown,
    ));

    // Stale-workspace GC (spec.md §3 Lifecycles): persistent workspaces
    // untouched for 7 days are removed. Sweeps once at startup, then daily.
    let gc_state = Arc::clone(&state);
    let mut gc_shutdown = shutdown_rx.clone();
    let gc_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match ax_pipeline::gc_stale_workspaces(&gc_state.data_dir, std::time::SystemTime::now()) {
                        Ok(removed) if !removed.is_empty() => {
                            info!(count = removed.len(), "swept stale workspaces");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "workspace gc sweep failed"),
                    }
                }
                _ = gc_shutdown.changed() => {
                    if *gc_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // HTTP API (spec.md §6).
    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "ax-host listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    server.await?;

    let _ = shutdown_tx.send(true);
    let _ = ipc_task.await;
    let _ = scheduler_task.await;
    let _ = gc_task.await;
    let _ = heartbeat_task.await;
    fired_task.abort();

    Ok(())
}

async fn send(message: &str, host: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{host}/v1/chat/completions"))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": message}],
            "stream": false,
        }))
        .send()
        .await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("request failed ({status}): {body}");
    }

    let body: serde_json::Value = resp.json().await?;
    if let Some(text) = body["content"][0]["text"].as_str() {
        println!("{text}");
    } else {
        println!("{body}");
    }
    Ok(())
}

fn configure() -> anyhow::Result<()> {
    println!("The interactive configure wizard is not part of this host.");
    println!("Edit your configuration at $AX_CONFIG, or the default path under your data directory (ax.toml).");
    Ok(())
}

fn bootstrap() -> anyhow::Result<()> {
    let config = ax_core::config::AxConfig::default();
    let data_dir = std::path::PathBuf::from(config.data_dir());
    std::fs::create_dir_all(&data_dir)?;
    std::fs::create_dir_all(data_dir.join("workspaces"))?;
    std::fs::create_dir_all(data_dir.join("skills"))?;
    std::fs::create_dir_all(data_dir.join("agents").join("default"))?;
    std::fs::create_dir_all(data_dir.join("proposals"))?;

    let config_path = data_dir.join("ax.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, toml_string(&config))?;
        println!("Wrote default configuration to {}", config_path.display());
    } else {
        println!("Configuration already exists at {}", config_path.display());
    }
    println!("Data directory ready at {}", data_dir.display());
    Ok(())
}

/// Minimal hand-rolled TOML emission for the small, flat default config —
/// avoids pulling in a TOML *writer* when the workspace only otherwise
/// needs a TOML *reader* (figment's `Toml` provider).
fn toml_string(config: &ax_core::config::AxConfig) -> String {
    format!(
        "[gateway]\nbind = \"{}\"\nport = {}\n\n[agent]\nmodel = \"{}\"\nprofile = \"{}\"\ncontext_window = {}\nmax_turns = {}\n\n[sandbox]\ntimeout_sec = {}\nmemory_mb = {}\n",
        config.gateway.bind,
        config.gateway.port,
        config.agent.model,
        config.agent.profile,
        config.agent.context_window,
        config.agent.max_turns,
        config.sandbox.timeout_sec,
        config.sandbox.memory_mb,
    )
}
