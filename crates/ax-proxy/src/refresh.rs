//! The reactive-401 callback contract. Kept as a trait so the proxy never
//! hard-depends on how credentials are actually refreshed beyond the one
//! concrete refresher this workspace ships.

use async_trait::async_trait;

#[async_trait]
pub trait RefreshCallback: Send + Sync {
    /// Attempt a refresh. Failure is swallowed by the caller — the original
    /// 401 is surfaced to the client either way.
    async fn refresh(&self) -> bool;
}

#[async_trait]
impl RefreshCallback for ax_creds::CredsRefresher {
    async fn refresh(&self) -> bool {
        self.refresh_oauth_token_from_env().await.is_ok()
    }
}
