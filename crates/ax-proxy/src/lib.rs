//! C11 — credential-injecting upstream proxy. Sandboxed agents never see a
//! real API key or OAuth token; they talk to this Unix-domain-socket proxy,
//! which injects the host's own credentials and streams the upstream
//! response straight through.

pub mod auth;
pub mod error;
pub mod handler;
pub mod refresh;
pub mod server;
pub mod state;

pub use auth::AuthMode;
pub use error::{ProxyError, Result};
pub use refresh::RefreshCallback;
pub use state::ProxyState;
