use std::sync::Arc;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

use crate::api::common::{
    encode_json, ensure_success, json_response, parse_json_body, sse_ok_response,
};
use crate::api::speech::synthesize;
use crate::audio::encode_chat_audio;
use crate::auth::extract_bearer_key;
use crate::error::ProxyError;
use crate::observability::log_usage;
use crate::protocol::gemini::encoder::encode_gemini_request;
use crate::protocol::gemini::response_decoder::assemble_completion;
use crate::protocol::gemini::speech::chat_tts_input;
use crate::protocol::gemini::stream::DeltaSynthesizer;
use crate::protocol::gemini::GeminiResponse;
use crate::protocol::openai_chat::{
    OpenAiAudioOutput, OpenAiChatRequest, OpenAiChatResponse, OpenAiChoice, OpenAiResponseMessage,
};
use crate::routing::model::resolve_chat_model;
use crate::state::AppState;
use crate::stream::ChatCompletionStream;
use crate::transport::UpstreamReply;
use crate::util::{next_completion_id, unix_now_secs};

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
    let request: OpenAiChatRequest = parse_json_body(body, "chat completion request")?;
    let api_key = extract_bearer_key(headers);
    if request.wants_audio() {
        return chat_audio(state, api_key, &request).await;
    }

    let model = resolve_chat_model(request.model.as_deref(), &state.config.models.default_chat);
    let stream = request.is_stream();
    tracing::debug!(
        model = %model.name,
        stream,
        google_search = model.google_search,
        messages = request.messages.len(),
        "chat completion request"
    );

    let upstream_request = encode_gemini_request(
        &request,
        &model,
        &state.transport,
        &state.config.features.safety_threshold,
    )
    .await?;
    let payload = encode_json(&upstream_request)?;
    let url = state.endpoints.generate_content(&model.name, stream)?;
    let upstream_headers = state.endpoints.headers(api_key, true)?;
    let response = state.transport.post_json(&url, upstream_headers, payload).await?;
    let response = ensure_success(response).await?;
    let id = next_completion_id();

    if stream {
        let synthesizer = DeltaSynthesizer::new(id, model.name, request.include_usage());
        let stream = ChatCompletionStream::new(response.bytes_stream(), synthesizer);
        return Ok(sse_ok_response(Body::from_stream(stream)));
    }

    let reply = UpstreamReply::read(response).await?;
    let upstream: GeminiResponse = reply.decode()?;
    if !upstream.has_candidates() && upstream.block_reason().is_none() {
        tracing::warn!("upstream response has no candidates, relaying it unchanged");
        return Err(reply.relay());
    }
    let completion = assemble_completion(upstream, &id, &model.name);
    log_usage(&completion.model, completion.usage.as_ref());
    Ok(json_response(&completion))
}

/// Chat request with `modalities: ["audio"]`: speak the last message.
async fn chat_audio(
    state: &AppState,
    api_key: Option<&str>,
    request: &OpenAiChatRequest,
) -> Result<Response, ProxyError> {
    let (transcript, voice) = chat_tts_input(request)?;
    let pcm = synthesize(state, api_key, &transcript, &voice).await?;
    let requested = request.audio.as_ref().and_then(|audio| audio.format.as_deref());
    let (format, bytes) = encode_chat_audio(pcm, requested);

    let completion = OpenAiChatResponse {
        id: next_completion_id(),
        object: "chat.completion".to_string(),
        created: unix_now_secs(),
        model: request
            .model
            .clone()
            .unwrap_or_else(|| state.config.models.tts.clone()),
        choices: vec![OpenAiChoice {
            index: 0,
            message: Some(OpenAiResponseMessage {
                role: "assistant".to_string(),
                audio: Some(OpenAiAudioOutput {
                    format: format.to_string(),
                    data: STANDARD.encode(&bytes),
                    transcript,
                }),
                ..OpenAiResponseMessage::default()
            }),
            logprobs: None,
            finish_reason: Some("stop".to_string()),
        }],
        usage: None,
    };
    Ok(json_response(&completion))
}
