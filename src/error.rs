use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Client-facing request errors. Everything else the engine encounters
/// (upstream refusal, cache failure, orphan destination, no path) is
/// recovered internally and reflected as a successful `null` result.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source title does not exist: {0}")]
    InvalidSource(String),
    #[error("destination title does not exist: {0}")]
    InvalidDestination(String),
    #[error("malformed request: missing key(s) {0:?}")]
    MalformedRequest(Vec<&'static str>),
    #[error("search timed out")]
    Timeout,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidSource(_) | Error::InvalidDestination(_) => StatusCode::NOT_FOUND,
            Error::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
