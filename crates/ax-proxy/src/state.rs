use std::sync::Arc;

use crate::auth::AuthMode;
use crate::refresh::RefreshCallback;

/// Shared state for one running proxy instance. A fresh instance is built
/// per completion (the auth mode and upstream base URL are resolved once at
/// completion-start per spec, not re-read per request).
pub struct ProxyState {
    pub upstream_base_url: String,
    pub auth: AuthMode,
    pub refresh: Option<Arc<dyn RefreshCallback>>,
}

impl ProxyState {
    pub fn new(upstream_base_url: impl Into<String>, auth: AuthMode, refresh: Option<Arc<dyn RefreshCallback>>) -> Self {
        Self { upstream_base_url: upstream_base_url.into(), auth, refresh }
    }
}
