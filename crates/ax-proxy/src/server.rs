//! Manual Unix-domain-socket accept loop. `axum::serve` assumes a TCP-style
//! listener abstraction that doesn't exist for UDS without extra glue, and
//! the spec's own framing anticipates a plain hyper accept loop here, so
//! this mirrors `SchedulerEngine::run`'s watch-channel shutdown shape
//! instead of reaching for a web framework.

use std::path::Path;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::state::ProxyState;

pub async fn serve(socket_path: &Path, state: Arc<ProxyState>, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "proxy listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "proxy accept failed");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { crate::handler::handle(req, state).await }
                    });
                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!(error = %e, "proxy connection error");
                    }
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("proxy shutting down");
                    break;
                }
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}
