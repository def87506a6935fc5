use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::Engine;
use crate::error::Error;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/links", post(links))
        .with_state(state)
}

async fn ping() -> &'static str {
    "woohoo"
}

#[derive(Debug, Deserialize)]
struct LinksRequest {
    source: String,
    destination: String,
}

async fn links(State(state): State<AppState>, body: bytes::Bytes) -> impl IntoResponse {
    match handle_links(&state, &body).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_links(state: &AppState, body: &[u8]) -> Result<Option<Vec<String>>, Error> {
    let req: LinksRequest = serde_json::from_slice(body).map_err(|_| missing_keys_error(body))?;

    let search = state.engine.race(&req.source, &req.destination);
    match tokio::time::timeout(state.request_timeout, search).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}

/// On a strict-deserialize failure, re-parse loosely to name the specific
/// missing/malformed key(s) rather than reporting a generic parse error
/// (§9 "Dynamic validation of request body").
fn missing_keys_error(body: &[u8]) -> Error {
    let loose: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return Error::MalformedRequest(vec!["source", "destination"]),
    };
    let mut missing = Vec::new();
    if !loose.get("source").is_some_and(Value::is_string) {
        missing.push("source");
    }
    if !loose.get("destination").is_some_and(Value::is_string) {
        missing.push("destination");
    }
    if missing.is_empty() {
        // Body had both keys as strings but still failed to deserialize;
        // shouldn't happen given `LinksRequest`'s shape, but report generically.
        missing.push("source");
        missing.push("destination");
    }
    Error::MalformedRequest(missing)
}
