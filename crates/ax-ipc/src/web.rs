//! `web_fetch` SSRF guard and body-size cap. `web_search` has no concrete
//! provider in this workspace (out of scope per the spec's Non-goals around
//! outer integrations) — its handler returns an empty result set rather
//! than silently succeeding against a fake backend.

use std::net::IpAddr;
use std::time::Duration;

use url::Url;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    DisallowedScheme,
    DisallowedHost,
    Network(String),
    TooLarge,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::DisallowedScheme => write!(f, "only http/https URLs may be fetched"),
            FetchError::DisallowedHost => write!(f, "URL resolves to a disallowed address"),
            FetchError::Network(e) => write!(f, "fetch failed: {e}"),
            FetchError::TooLarge => write!(f, "response exceeded the 1 MiB cap"),
        }
    }
}

/// Rejects loopback, link-local, private (RFC 1918), unspecified, and IPv6
/// loopback/ULA addresses. Runs against the resolved socket address, not the
/// hostname string, so `localhost`, decimal-encoded IPs, and DNS rebinding
/// to a private address are all caught the same way.
fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local() || v4.is_private() || v4.is_unspecified() || v4.is_broadcast(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

pub async fn fetch(url_str: &str) -> Result<(u16, String), FetchError> {
    let url = Url::parse(url_str).map_err(|_| FetchError::DisallowedScheme)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FetchError::DisallowedScheme);
    }
    let host = url.host_str().ok_or(FetchError::DisallowedHost)?;

    let addrs = tokio::net::lookup_host((host, url.port_or_known_default().unwrap_or(443)))
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    for addr in addrs {
        if is_blocked(addr.ip()) {
            return Err(FetchError::DisallowedHost);
        }
    }

    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| FetchError::Network(e.to_string()))?;
    let resp = client.get(url).send().await.map_err(|e| FetchError::Network(e.to_string()))?;
    let status = resp.status().as_u16();

    let bytes = resp.bytes().await.map_err(|e| FetchError::Network(e.to_string()))?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(FetchError::TooLarge);
    }
    Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let err = fetch("file:///etc/passwd").await.unwrap_err();
        assert_eq!(err, FetchError::DisallowedScheme);
    }

    #[tokio::test]
    async fn rejects_loopback_host() {
        let err = fetch("http://127.0.0.1/secret").await.unwrap_err();
        assert_eq!(err, FetchError::DisallowedHost);
    }

    #[tokio::test]
    async fn rejects_private_range_host() {
        let err = fetch("http://10.0.0.5/").await.unwrap_err();
        assert_eq!(err, FetchError::DisallowedHost);
    }

    #[tokio::test]
    async fn rejects_link_local_host() {
        let err = fetch("http://169.254.169.254/latest/meta-data").await.unwrap_err();
        assert_eq!(err, FetchError::DisallowedHost);
    }
}
