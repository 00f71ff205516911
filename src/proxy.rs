//! Edge proxy: forwards chat payloads to the upstream completion API with a
//! server-held credential and answers in one JSON envelope shape.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::ProxyConfig;
use crate::error::RoutineError;

#[derive(Clone)]
pub struct ProxyState {
    upstream_url: String,
    default_model: String,
    default_max_tokens: u32,
    /// Environment variable holding the upstream key, read on every request
    credential_env: String,
    client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: &ProxyConfig) -> Self {
        ProxyState {
            upstream_url: config.upstream_url.clone(),
            default_model: config.default_model.clone(),
            default_max_tokens: config.default_max_tokens,
            credential_env: config.credential_env.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Option<Vec<Value>>,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    max_completion_tokens: Option<u64>,
}

pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let state = ProxyState::new(&config);
    let app = build_router(state);

    let addr: SocketAddr = config.listen.parse()?;
    info!("edge proxy listening on {addr}, upstream {}", config.upstream_url);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

/// One logical endpoint: every path and method lands in `handle`.
pub fn build_router(state: ProxyState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn envelope(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, cors_headers(), body.to_string()).into_response()
}

async fn handle(State(state): State<ProxyState>, method: Method, body: Bytes) -> Response {
    if method == Method::OPTIONS {
        return (StatusCode::NO_CONTENT, cors_headers()).into_response();
    }

    match forward(&state, &body).await {
        Ok(reply) => {
            info!(status = 200, "proxied chat request");
            envelope(200, reply)
        }
        Err(err) => {
            let status = err.status();
            if status >= 500 {
                error!(status, "proxy request failed: {err}");
            } else {
                warn!(status, "proxy request rejected: {err}");
            }
            envelope(status, json!({ "error": err.envelope_body() }))
        }
    }
}

async fn forward(state: &ProxyState, body: &[u8]) -> Result<Value, RoutineError> {
    let api_key = std::env::var(&state.credential_env)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            RoutineError::Configuration(format!(
                "{} not set in proxy environment",
                state.credential_env
            ))
        })?;

    let input: ProxyRequest = match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    }
    .ok_or_else(|| RoutineError::BadRequest("Invalid JSON body".to_string()))?;

    let model = input
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.default_model.clone());
    let max_tokens = input
        .max_tokens
        .filter(|&n| n > 0)
        .or(input.max_completion_tokens.filter(|&n| n > 0))
        .unwrap_or(u64::from(state.default_max_tokens));

    let request_body = json!({
        "model": model,
        "messages": input.messages.unwrap_or_default(),
        "max_tokens": max_tokens,
    });

    let response = state
        .client
        .post(&state.upstream_url)
        .bearer_auth(api_key)
        .json(&request_body)
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    let data: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

    if !status.is_success() {
        return Err(RoutineError::Upstream {
            prefix: "Upstream",
            status: Some(status.as_u16()),
            detail: data.to_string(),
            body: data,
        });
    }

    let reply = data
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null);

    Ok(json!({ "reply": reply, "raw": data }))
}
