//! The compactor's one upstream call, grounded on `ax_ipc::llm::call`'s
//! shape but kept local to this crate rather than depending on `ax-ipc`
//! wholesale — the pipeline only ever needs this one summarisation call,
//! not IPC's full action surface.

use ax_proxy::AuthMode;
use ax_store::LlmCall;
use async_trait::async_trait;
use serde_json::json;

const COMPACTION_MAX_TOKENS: u64 = 1024;

/// Calls the upstream model directly (never through the sandbox) to
/// summarise the older half of a session's history during compaction.
pub struct HostLlmCaller {
    upstream_base_url: String,
    auth: AuthMode,
    model: String,
}

impl HostLlmCaller {
    pub fn new(upstream_base_url: impl Into<String>, auth: AuthMode, model: impl Into<String>) -> Self {
        Self {
            upstream_base_url: upstream_base_url.into(),
            auth,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmCall for HostLlmCaller {
    async fn call(&self, system: &str, transcript: &str) -> Result<String, String> {
        let headers = ax_proxy::auth::auth_headers(&self.auth).ok_or_else(|| "no upstream credentials configured".to_string())?;

        let body = json!({
            "model": self.model,
            "max_tokens": COMPACTION_MAX_TOKENS,
            "system": system,
            "messages": [{"role": "user", "content": transcript}],
        });

        let client = reqwest::Client::new();
        let url = format!("{}/v1/messages", self.upstream_base_url.trim_end_matches('/'));
        let mut req = client.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("{status}: {text}"));
        }

        let value: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
        extract_text(&value).ok_or_else(|| "empty or malformed completion response".to_string())
    }
}

/// Pulls the first text block out of an upstream `{content:[{type,text}…]}`
/// response body.
fn extract_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("content")?
        .as_array()?
        .iter()
        .find_map(|block| block.get("text").and_then(|t| t.as_str()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_reads_the_first_text_block() {
        let value = serde_json::json!({
            "content": [{"type": "text", "text": "summary body"}]
        });
        assert_eq!(extract_text(&value).as_deref(), Some("summary body"));
    }

    #[test]
    fn extract_text_is_none_for_missing_content() {
        let value = serde_json::json!({"content": []});
        assert_eq!(extract_text(&value), None);
    }
}
