use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{self, Body};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE,
};

use crate::api::{chat, embeddings, health, models, speech};
use crate::error::ProxyError;
use crate::observability::log_request_complete;
use crate::state::AppState;

const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch {
    Preflight,
    Health,
    Models,
    ChatCompletions,
    Embeddings,
    Speech,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function never returns `Err`; every failure is rendered as a response.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path());

    let mut response = match route {
        RouteMatch::Preflight => preflight_response(),
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Models => models::handler(state, &parts.headers).await,
        RouteMatch::ChatCompletions | RouteMatch::Embeddings | RouteMatch::Speech => {
            match read_request_body(body, state.config.server.max_body_bytes).await {
                Ok(bytes) => match route {
                    RouteMatch::ChatCompletions => chat::handler(state, parts.headers, bytes).await,
                    RouteMatch::Embeddings => embeddings::handler(state, parts.headers, bytes).await,
                    _ => speech::handler(state, parts.headers, bytes).await,
                },
                Err(response) => response,
            }
        }
        RouteMatch::MethodNotAllowed => ProxyError::with_status(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} not allowed", parts.method),
        )
        .into_response(),
        RouteMatch::NotFound => {
            ProxyError::with_status(StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
    };

    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    log_request_complete(&parts.method, parts.uri.path(), response.status(), start);
    Ok(response)
}

fn preflight_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
    );
    response
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, limit).await.map_err(|_| {
        ProxyError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Request body too large (max {limit} bytes)"),
        )
        .into_response()
    })
}

fn expect_method(method: &Method, wanted: Method, route: RouteMatch) -> RouteMatch {
    if *method == wanted {
        route
    } else {
        RouteMatch::MethodNotAllowed
    }
}

/// Endpoints match by path suffix so that any prefix (`/v1`, `/openai/v1`)
/// reaches them.
fn match_route(method: &Method, path: &str) -> RouteMatch {
    if method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }
    let path = path.trim_end_matches('/');
    if path.is_empty() || path == "/health" {
        return expect_method(method, Method::GET, RouteMatch::Health);
    }
    if path.ends_with("/chat/completions") {
        expect_method(method, Method::POST, RouteMatch::ChatCompletions)
    } else if path.ends_with("/embeddings") {
        expect_method(method, Method::POST, RouteMatch::Embeddings)
    } else if path.ends_with("/models") {
        expect_method(method, Method::GET, RouteMatch::Models)
    } else if path.ends_with("/audio/speech") {
        expect_method(method, Method::POST, RouteMatch::Speech)
    } else {
        RouteMatch::NotFound
    }
}
