//! POST /v1/chat/completions — spec.md §6's HTTP API. Accepts an
//! upstream-compatible chat request, runs it through the completion
//! pipeline (C13), and replies in the same shape: a single JSON object, or
//! an SSE stream of `message_start`/`content_block_*`/`message_stop` events
//! when `stream:true`. Grounded on the teacher's OpenAI-compat endpoint,
//! re-targeted at the upstream message shape spec.md §6 names explicitly.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use ax_core::types::{AddressScope, InboundMessage, SessionAddress};
use ax_pipeline::{CompletionRequest, InboundSource, SessionKind};

use crate::app::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    #[allow(dead_code)]
    pub model: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct UpstreamError {
    #[serde(rename = "type")]
    kind: &'static str,
    error: UpstreamErrorBody,
}

#[derive(Serialize)]
struct UpstreamErrorBody {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

impl UpstreamError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: "error",
            error: UpstreamErrorBody { kind, message: message.into() },
        }
    }
}

fn last_user_message(req: &ChatRequest) -> Option<String> {
    req.messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone())
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<UpstreamError>)> {
    let content = last_user_message(&req).ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(UpstreamError::new("invalid_request_error", "no user message found")))
    })?;

    let session = match &req.session_id {
        Some(id) => SessionAddress::new("http", AddressScope::Dm).with_identifier("session", id.clone()),
        None => SessionAddress::new("http", AddressScope::Dm).with_identifier("session", uuid::Uuid::new_v4().to_string()),
    };

    let request = CompletionRequest {
        inbound: InboundSource::Raw(InboundMessage::new(session.clone(), "http-client", content)),
        session: if req.session_id.is_some() {
            SessionKind::Persistent(session)
        } else {
            SessionKind::Ephemeral { prior_turns: Vec::new() }
        },
        user_id: None,
        agent_id: None,
        reply_optional: false,
        needs_direct_upstream: false,
        profile: state.config.agent.profile,
    };

    if req.stream {
        Ok(stream_response(state, request).await.into_response())
    } else {
        Ok(non_streaming_response(state, request).await.into_response())
    }
}

async fn non_streaming_response(state: Arc<AppState>, request: CompletionRequest) -> impl IntoResponse {
    match state.pipeline.run(request).await {
        Ok(outcome) => {
            let finish_reason = if outcome.blocked { "content_filter" } else { "end_turn" };
            (
                StatusCode::OK,
                Json(json!({
                    "id": format!("msg_{}", uuid::Uuid::new_v4()),
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "text", "text": outcome.reply}],
                    "stop_reason": finish_reason,
                })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "completion pipeline failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(UpstreamError::new("api_error", e.user_message())),
            )
                .into_response()
        }
    }
}

async fn stream_response(
    state: Arc<AppState>,
    request: CompletionRequest,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let id = format!("msg_{}", uuid::Uuid::new_v4());
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("message_start").data(
            json!({"type": "message_start", "message": {"id": id, "role": "assistant"}}).to_string(),
        ));

        match state.pipeline.run(request).await {
            Ok(outcome) => {
                let finish_reason = if outcome.blocked { "content_filter" } else { "end_turn" };
                yield Ok(Event::default().event("content_block_start").data(
                    json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}).to_string(),
                ));
                yield Ok(Event::default().event("content_block_delta").data(
                    json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": outcome.reply}}).to_string(),
                ));
                yield Ok(Event::default().event("content_block_stop").data(
                    json!({"type": "content_block_stop", "index": 0}).to_string(),
                ));
                yield Ok(Event::default().event("message_delta").data(
                    json!({"type": "message_delta", "delta": {"stop_reason": finish_reason}}).to_string(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "streaming completion failed");
                yield Ok(Event::default().event("error").data(
                    json!({"type": "error", "error": {"type": "api_error", "message": e.user_message()}}).to_string(),
                ));
            }
        }

        yield Ok(Event::default().event("message_stop").data(json!({"type": "message_stop"}).to_string()));
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
