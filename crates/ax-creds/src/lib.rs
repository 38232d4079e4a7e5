//! C14 — credential refresher. Pre-flight OAuth refresh before a completion
//! that needs direct upstream access, plus the reactive callback C11 invokes
//! on a 401. Grounded on `QwenOAuthProvider::ensure_token`'s
//! read-fast-path/write-slow-path shape, adapted from "refresh proactively
//! on expiry" to "refresh reactively after an external 401 callback runs" —
//! the two entry points below share the same refresh call but differ in
//! when they decide to invoke it.

pub mod dotenv;
pub mod error;

use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

pub use error::{CredsError, Result};

pub const ACCESS_TOKEN_VAR: &str = "CLAUDE_CODE_OAUTH_TOKEN";
pub const REFRESH_TOKEN_VAR: &str = "AX_OAUTH_REFRESH_TOKEN";
pub const EXPIRES_AT_VAR: &str = "AX_OAUTH_EXPIRES_AT";

const FRESHNESS_WINDOW_SEC: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Reads the three OAuth env vars and rewrites `.env` on refresh. One
/// instance is shared between the pipeline's pre-flight check (C13 step 7)
/// and the proxy's reactive-401 callback (C11).
pub struct CredsRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    env_path: PathBuf,
}

impl CredsRefresher {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>, env_path: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            env_path,
        }
    }

    /// Pre-flight check: if the refresh token or its expiry are absent,
    /// there is nothing to do — the caller will fail fast elsewhere if
    /// credentials turn out to be missing entirely. If expiry is more than
    /// five minutes away, also a no-op. Otherwise refreshes synchronously.
    pub async fn ensure_oauth_token_fresh(&self) -> Result<()> {
        let Ok(refresh_token) = std::env::var(REFRESH_TOKEN_VAR) else {
            return Ok(());
        };
        let Ok(expires_at_str) = std::env::var(EXPIRES_AT_VAR) else {
            return Ok(());
        };
        let Ok(expires_at) = expires_at_str.parse::<i64>() else {
            return Ok(());
        };

        let now = Utc::now().timestamp();
        if expires_at - now > FRESHNESS_WINDOW_SEC {
            return Ok(());
        }

        self.do_refresh(&refresh_token).await
    }

    /// Callback for C11's reactive-401 retry: always refreshes, regardless
    /// of the recorded expiry, since a 401 means the upstream has already
    /// decided the current token is no good.
    pub async fn refresh_oauth_token_from_env(&self) -> Result<()> {
        let refresh_token = std::env::var(REFRESH_TOKEN_VAR).map_err(|_| CredsError::MissingRefreshToken)?;
        self.do_refresh(&refresh_token).await
    }

    async fn do_refresh(&self, refresh_token: &str) -> Result<()> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
        ];

        let resp = match self.client.post(&self.token_url).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "oauth token refresh request failed");
                return Err(CredsError::Refresh(e.to_string()));
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, "oauth token refresh rejected by upstream");
            return Err(CredsError::Refresh(format!("upstream returned {status}")));
        }

        let parsed: TokenRefreshResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "oauth token refresh response was not valid JSON");
                return Err(CredsError::Refresh(e.to_string()));
            }
        };

        let new_refresh_token = parsed.refresh_token.unwrap_or_else(|| refresh_token.to_string());
        let new_expires_at = (Utc::now().timestamp() + parsed.expires_in).to_string();

        std::env::set_var(ACCESS_TOKEN_VAR, &parsed.access_token);
        std::env::set_var(REFRESH_TOKEN_VAR, &new_refresh_token);
        std::env::set_var(EXPIRES_AT_VAR, &new_expires_at);

        if let Err(e) = dotenv::rewrite_env_file(
            &self.env_path,
            &[
                (ACCESS_TOKEN_VAR, parsed.access_token.as_str()),
                (REFRESH_TOKEN_VAR, new_refresh_token.as_str()),
                (EXPIRES_AT_VAR, new_expires_at.as_str()),
            ],
        ) {
            warn!(error = %e, "failed to persist refreshed oauth token to .env");
        }

        info!("oauth token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The env vars under test are process-global; tokio::test bodies can run
    // on different worker threads concurrently, so serialise them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn ensure_fresh_is_noop_without_refresh_token() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(REFRESH_TOKEN_VAR);
        std::env::remove_var(EXPIRES_AT_VAR);
        let dir = tempfile::tempdir().unwrap();
        let refresher = CredsRefresher::new("https://example.invalid/token", "client", dir.path().join(".env"));
        assert!(refresher.ensure_oauth_token_fresh().await.is_ok());
    }

    #[tokio::test]
    async fn ensure_fresh_is_noop_when_far_from_expiry() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(REFRESH_TOKEN_VAR, "rtok");
        std::env::set_var(EXPIRES_AT_VAR, (Utc::now().timestamp() + 3600).to_string());
        let dir = tempfile::tempdir().unwrap();
        let refresher = CredsRefresher::new("https://example.invalid/token", "client", dir.path().join(".env"));
        assert!(refresher.ensure_oauth_token_fresh().await.is_ok());
        std::env::remove_var(REFRESH_TOKEN_VAR);
        std::env::remove_var(EXPIRES_AT_VAR);
    }

    #[tokio::test]
    async fn reactive_refresh_without_refresh_token_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(REFRESH_TOKEN_VAR);
        let dir = tempfile::tempdir().unwrap();
        let refresher = CredsRefresher::new("https://example.invalid/token", "client", dir.path().join(".env"));
        let err = refresher.refresh_oauth_token_from_env().await.unwrap_err();
        assert!(matches!(err, CredsError::MissingRefreshToken));
    }
}
