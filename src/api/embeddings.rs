use std::sync::Arc;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::api::common::{encode_json, ensure_success, json_response, parse_json_body};
use crate::auth::extract_bearer_key;
use crate::error::ProxyError;
use crate::protocol::gemini::embeddings::{build_batch_embed_request, map_embeddings};
use crate::protocol::gemini::GeminiBatchEmbedResponse;
use crate::protocol::openai_embeddings::OpenAiEmbeddingsRequest;
use crate::routing::model::resolve_embeddings_model;
use crate::state::AppState;
use crate::transport::UpstreamReply;

pub async fn handler(state: Arc<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match handler_inner(&state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handler_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ProxyError> {
    let request: OpenAiEmbeddingsRequest = parse_json_body(body, "embeddings request")?;
    let Some(requested) = request.model.as_str() else {
        return Err(ProxyError::invalid_request("model is not specified"));
    };
    let model = resolve_embeddings_model(requested, &state.config.models.default_embeddings);
    let texts = request.input.into_texts();
    tracing::debug!(model = %model.resource, inputs = texts.len(), "embeddings request");

    let payload = encode_json(&build_batch_embed_request(&model, texts, request.dimensions))?;
    let url = state.endpoints.batch_embed(&model.resource)?;
    let upstream_headers = state.endpoints.headers(extract_bearer_key(headers), true)?;
    let response = state.transport.post_json(&url, upstream_headers, payload).await?;
    let response = ensure_success(response).await?;
    let embeddings: GeminiBatchEmbedResponse = UpstreamReply::read(response).await?.decode()?;
    Ok(json_response(&map_embeddings(embeddings, &model)))
}
