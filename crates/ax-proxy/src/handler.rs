//! Request dispatch for the credential-injecting proxy. Only `POST
//! /v1/messages` and `OPTIONS` are routed; everything else gets the
//! upstream's own 404 error shape so a misbehaving sandboxed agent learns
//! nothing about what else might be listening on the socket.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{Method, Request, Response, StatusCode};

use crate::auth::auth_headers;
use crate::state::ProxyState;

const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const MESSAGES_PATH: &str = "/v1/messages";

type ProxyBody = BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into()).map_err(|never: Infallible| match never {}).boxed()
}

fn not_found() -> Response<ProxyBody> {
    let body = serde_json::json!({
        "type": "error",
        "error": { "type": "not_found", "message": "Not found" }
    })
    .to_string();
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("content-type", "application/json")
        .body(full_body(body))
        .expect("static response is well-formed")
}

fn preflight() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "POST, OPTIONS")
        .header("access-control-allow-headers", "*")
        .body(full_body(Bytes::new()))
        .expect("static response is well-formed")
}

fn upstream_unreachable(detail: &str) -> Response<ProxyBody> {
    let body = serde_json::json!({
        "type": "error",
        "error": { "type": "api_error", "message": detail }
    })
    .to_string();
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("content-type", "application/json")
        .body(full_body(body))
        .expect("static response is well-formed")
}

/// Headers that are meaningless or actively wrong to forward unchanged:
/// `host` names the socket, not the upstream; `connection` and
/// `content-length` are reset by the outgoing client; any prior
/// authorization is replaced by ours.
fn forwardable_headers(req: &Request<Incoming>) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in req.headers() {
        let lower = name.as_str().to_ascii_lowercase();
        if matches!(lower.as_str(), "host" | "connection" | "content-length" | "authorization" | "x-api-key") {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.insert(n, v);
        }
    }
    out
}

async fn forward_once(
    client: &reqwest::Client,
    state: &ProxyState,
    headers: reqwest::header::HeaderMap,
    body: Bytes,
) -> Result<reqwest::Response, reqwest::Error> {
    let url = format!("{}{MESSAGES_PATH}", state.upstream_base_url.trim_end_matches('/'));
    let mut builder = client.post(url).headers(headers);
    if let Some(auth) = auth_headers(&state.auth) {
        for (k, v) in auth {
            builder = builder.header(k, v);
        }
    }
    builder.body(body).send().await
}

fn stream_response(resp: reqwest::Response) -> Response<ProxyBody> {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in resp.headers() {
        if name.as_str().eq_ignore_ascii_case("transfer-encoding") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let stream = resp.bytes_stream().map(|chunk| {
        chunk
            .map(Frame::data)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    });
    let body = StreamBody::new(stream).boxed();
    builder.body(body).unwrap_or_else(|_| not_found())
}

async fn handle_messages(req: Request<Incoming>, state: Arc<ProxyState>) -> Response<ProxyBody> {
    let headers = forwardable_headers(&req);
    let body_bytes = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return upstream_unreachable(&format!("failed to read request body: {e}")),
    };
    if body_bytes.len() > MAX_BODY_BYTES {
        return Response::builder()
            .status(StatusCode::PAYLOAD_TOO_LARGE)
            .body(full_body(Bytes::new()))
            .expect("static response is well-formed");
    }

    let client = reqwest::Client::new();
    let first = match forward_once(&client, &state, headers.clone(), body_bytes.clone()).await {
        Ok(r) => r,
        Err(e) => return upstream_unreachable(&e.to_string()),
    };

    if first.status().as_u16() == 401 {
        if let Some(refresh) = &state.refresh {
            if crate::auth::retries_on_401(&state.auth) && refresh.refresh().await {
                match forward_once(&client, &state, headers, body_bytes).await {
                    Ok(retried) => return stream_response(retried),
                    Err(e) => return upstream_unreachable(&e.to_string()),
                }
            }
        }
    }

    stream_response(first)
}

pub async fn handle(req: Request<Incoming>, state: Arc<ProxyState>) -> Result<Response<ProxyBody>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, MESSAGES_PATH) => preflight(),
        (&Method::POST, MESSAGES_PATH) => handle_messages(req, state).await,
        _ => not_found(),
    };
    Ok(response)
}
