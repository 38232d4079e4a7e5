//! `llm_call` handler: the one IPC action that talks to the upstream model
//! directly rather than through the C11 proxy, since its inputs/outputs need
//! to pass through the taint budget and scanner before and after the call.
//! Auth header construction is shared with the proxy via `ax_proxy::auth`
//! so the two call sites never drift on how key vs OAuth mode is expressed.

use ax_proxy::AuthMode;
use serde_json::Value;

#[derive(Debug)]
pub enum LlmError {
    MissingCredentials,
    Upstream(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::MissingCredentials => write!(f, "no upstream credentials configured"),
            LlmError::Upstream(e) => write!(f, "upstream call failed: {e}"),
        }
    }
}

pub async fn call(upstream_base_url: &str, auth: &AuthMode, body: Value) -> Result<Value, LlmError> {
    let headers = ax_proxy::auth::auth_headers(auth).ok_or(LlmError::MissingCredentials)?;

    let client = reqwest::Client::new();
    let mut req = client.post(format!("{}/v1/messages", upstream_base_url.trim_end_matches('/'))).json(&body);
    for (k, v) in headers {
        req = req.header(k, v);
    }

    let resp = req.send().await.map_err(|e| LlmError::Upstream(e.to_string()))?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Upstream(format!("{status}: {text}")));
    }
    resp.json::<Value>().await.map_err(|e| LlmError::Upstream(e.to_string()))
}
