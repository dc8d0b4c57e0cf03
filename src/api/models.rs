use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::api::common::{ensure_success, json_response};
use crate::auth::extract_bearer_key;
use crate::error::ProxyError;
use crate::protocol::gemini::embeddings::map_model_list;
use crate::protocol::gemini::GeminiModelList;
use crate::state::AppState;
use crate::transport::UpstreamReply;

/// Upstream model list in `OpenAI` shape.
pub async fn handler(state: Arc<AppState>, headers: &HeaderMap) -> Response {
    match handler_inner(&state, headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handler_inner(state: &AppState, headers: &HeaderMap) -> Result<Response, ProxyError> {
    let url = state.endpoints.models()?;
    let upstream_headers = state.endpoints.headers(extract_bearer_key(headers), false)?;
    let response = state.transport.get(&url, upstream_headers).await?;
    let response = ensure_success(response).await?;
    let list: GeminiModelList = UpstreamReply::read(response).await?.decode()?;
    tracing::debug!(count = list.models.len(), "listed upstream models");
    Ok(json_response(&map_model_list(list)))
}
