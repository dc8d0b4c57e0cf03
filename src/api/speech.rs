use std::sync::Arc;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderName, HeaderValue, StatusCode};

use crate::api::common::{encode_json, ensure_success, parse_json_body};
use crate::audio::encode_speech;
use crate::auth::extract_bearer_key;
use crate::error::ProxyError;
use crate::protocol::gemini::speech::{build_tts_request, extract_audio};
use crate::protocol::gemini::GeminiResponse;
use crate::protocol::openai_speech::OpenAiSpeechRequest;
use crate::state::AppState;
use crate::transport::UpstreamReply;

const X_WARNING: HeaderName = HeaderName::from_static("x-warning");

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
    let request: OpenAiSpeechRequest = parse_json_body(body, "speech request")?;
    let Some(input) = request.input.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ProxyError::invalid_request("`input` field is required."));
    };
    let Some(voice) = request.voice.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ProxyError::invalid_request("`voice` field is required."));
    };

    let pcm = synthesize(state, extract_bearer_key(headers), input, voice).await?;
    let audio = encode_speech(&pcm, request.response_format.as_deref());

    let mut response = Response::new(Body::from(audio.bytes));
    let response_headers = response.headers_mut();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static(audio.content_type));
    if let Some(warning) = audio.warning {
        tracing::warn!("{warning}");
        match HeaderValue::from_str(&warning) {
            Ok(value) => {
                response_headers.insert(X_WARNING, value);
            }
            Err(_) => tracing::debug!("warning text is not a valid header value"),
        }
    }
    Ok(response)
}

/// Run one upstream TTS call and return the decoded PCM.
pub(crate) async fn synthesize(
    state: &AppState,
    api_key: Option<&str>,
    text: &str,
    voice: &str,
) -> Result<Vec<u8>, ProxyError> {
    let model = &state.config.models.tts;
    tracing::debug!(model = %model, voice, chars = text.chars().count(), "speech request");

    let payload = encode_json(&build_tts_request(text, voice))?;
    let url = state.endpoints.generate_content(model, false)?;
    let upstream_headers = state.endpoints.headers(api_key, true)?;
    let response = state.transport.post_json(&url, upstream_headers, payload).await?;
    let response = ensure_success(response).await?;
    let upstream: GeminiResponse = UpstreamReply::read(response).await?.decode()?;

    let Some(data) = extract_audio(&upstream) else {
        tracing::error!(
            finish_reason = ?upstream
                .candidates
                .as_ref()
                .and_then(|c| c.first())
                .and_then(|c| c.finish_reason.as_deref()),
            "no audio in upstream speech response"
        );
        return Err(ProxyError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No audio data found in upstream response.",
        ));
    };
    STANDARD
        .decode(data)
        .map_err(|err| ProxyError::Internal(format!("Invalid audio payload from upstream: {err}")))
}
