//! C9 — IPC server. One Unix-domain-socket connection per sandboxed agent
//! process; one connection handles an unbounded sequence of length-prefixed
//! JSON request/response frames, sequentially (a single agent's requests are
//! never pipelined ahead of its own prior ones).

use std::path::Path;
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::app::IpcServices;
use crate::context::RequestContext;
use crate::frame::{read_frame, write_frame};

pub async fn serve(socket_path: &Path, ctx_factory: impl Fn() -> RequestContext + Send + Sync + 'static, app: Arc<IpcServices>, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "ipc server listening");
    let ctx_factory = Arc::new(ctx_factory);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "ipc accept failed");
                        continue;
                    }
                };
                let app = Arc::clone(&app);
                let ctx = (ctx_factory)();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx, app).await {
                        warn!(error = %e, "ipc connection ended with an error");
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("ipc server shutting down");
                    break;
                }
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

async fn handle_connection(mut stream: UnixStream, ctx: RequestContext, app: Arc<IpcServices>) -> std::io::Result<()> {
    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(p) => p,
            Err(crate::error::IpcError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => {
                error!(error = %e, "failed to read ipc frame");
                return Ok(());
            }
        };

        let response = process_one(&payload, &ctx, &app).await;
        let bytes = serde_json::to_vec(&response).unwrap_or_else(|_| b"{\"ok\":false,\"error\":\"internal\"}".to_vec());
        write_frame(&mut stream, &bytes).await.map_err(|e| match e {
            crate::error::IpcError::Io(io_err) => io_err,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        })?;
    }
}

async fn process_one(payload: &[u8], ctx: &RequestContext, app: &IpcServices) -> serde_json::Value {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(e) => return serde_json::json!({ "ok": false, "error": format!("malformed JSON: {e}") }),
    };

    let action = match value.get("action").and_then(serde_json::Value::as_str) {
        Some(a) => a.to_string(),
        None => return serde_json::json!({ "ok": false, "error": "missing action" }),
    };

    if let Err(e) = ax_schema::validate(&action, &value) {
        return serde_json::json!({ "ok": false, "error": e.to_string() });
    }

    crate::dispatch::route(&action, &value, ctx, app).await
}
