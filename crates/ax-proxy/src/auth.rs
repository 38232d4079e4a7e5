//! Two auth modes, chosen once per proxy instance at completion-start time.
//! Header construction is grounded on `AnthropicProvider::apply_auth`: key
//! mode sets `x-api-key`, OAuth mode sets a bearer token plus the beta
//! header the OAuth-flavoured upstream API requires.

const API_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";

#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Forward the body verbatim with a static API key header. A 401 here
    /// means the key itself is bad — never retried.
    ApiKey(String),
    /// Bearer token derived from the refresh-token-backed env vars. Read
    /// fresh on every request so a reactive refresh is picked up without
    /// restarting the proxy.
    OAuth,
}

/// Build the auth + version headers for one outbound request. Returns
/// `None` for OAuth mode if no access token is currently present in the
/// environment (the caller should fail the request rather than send it
/// with no auth at all).
pub fn auth_headers(mode: &AuthMode) -> Option<Vec<(&'static str, String)>> {
    match mode {
        AuthMode::ApiKey(key) => Some(vec![
            ("x-api-key", key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ]),
        AuthMode::OAuth => {
            let token = std::env::var(ax_creds::ACCESS_TOKEN_VAR).ok()?;
            Some(vec![
                ("authorization", format!("Bearer {token}")),
                ("anthropic-version", API_VERSION.to_string()),
                ("anthropic-beta", OAUTH_BETA.to_string()),
            ])
        }
    }
}

/// Only OAuth-mode requests are ever retried reactively — a key-mode 401
/// means the configured key itself is invalid, not expired.
pub fn retries_on_401(mode: &AuthMode) -> bool {
    matches!(mode, AuthMode::OAuth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_mode_never_retries() {
        assert!(!retries_on_401(&AuthMode::ApiKey("sk-test".to_string())));
    }

    #[test]
    fn oauth_mode_retries() {
        assert!(retries_on_401(&AuthMode::OAuth));
    }

    #[test]
    fn api_key_headers_include_x_api_key() {
        let headers = auth_headers(&AuthMode::ApiKey("sk-test".to_string())).unwrap();
        assert!(headers.iter().any(|(k, v)| *k == "x-api-key" && v == "sk-test"));
    }
}
