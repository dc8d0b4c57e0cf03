//! Helpers shared by the endpoint handlers.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProxyError;
use crate::transport::upstream_error;

/// Decode a client JSON body; any serde failure is a 400.
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, ProxyError> {
    serde_json::from_slice(body)
        .map_err(|err| ProxyError::invalid_request(format!("Invalid {what} body: {err}")))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<Bytes, ProxyError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| ProxyError::Internal(format!("Failed to encode upstream request: {err}")))
}

pub(crate) fn json_response<T: Serialize>(value: &T) -> Response {
    (StatusCode::OK, axum::Json(value)).into_response()
}

pub(crate) fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Pass a 2xx response through; anything else becomes a relayable error.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProxyError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(upstream_error(response).await)
    }
}
