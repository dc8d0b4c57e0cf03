//! Text-to-speech requests on the upstream TTS model.

use super::{
    GeminiContent, GeminiGenerationConfig, GeminiPart, GeminiPrebuiltVoiceConfig, GeminiRequest,
    GeminiResponse, GeminiSpeechConfig, GeminiVoiceConfig,
};
use crate::error::ProxyError;
use crate::protocol::openai_chat::OpenAiChatRequest;

#[must_use]
pub fn build_tts_request(text: &str, voice: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(text)],
        }],
        generation_config: Some(GeminiGenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(GeminiSpeechConfig {
                voice_config: GeminiVoiceConfig {
                    prebuilt_voice_config: GeminiPrebuiltVoiceConfig {
                        voice_name: voice.to_string(),
                    },
                },
            }),
            ..GeminiGenerationConfig::default()
        }),
        ..GeminiRequest::default()
    }
}

/// Base64 payload of the first inline audio part of the first candidate.
#[must_use]
pub fn extract_audio(response: &GeminiResponse) -> Option<&str> {
    let candidate = response.candidates.as_ref()?.first()?;
    candidate
        .content
        .as_ref()?
        .parts
        .iter()
        .find_map(|part| part.inline_data.as_ref())
        .map(|blob| blob.data.as_str())
        .filter(|data| !data.is_empty())
}

/// Transcript and voice for a chat request that asked for audio output.
pub fn chat_tts_input(req: &OpenAiChatRequest) -> Result<(String, String), ProxyError> {
    let Some(last) = req.messages.last() else {
        return Err(ProxyError::invalid_request(
            "`messages` array is required for TTS.",
        ));
    };
    let Some(voice) = req.audio.as_ref().and_then(|audio| audio.voice.clone()) else {
        return Err(ProxyError::invalid_request("`audio.voice` is required for TTS."));
    };
    let text = last
        .content
        .as_ref()
        .map(|content| content.joined_text(" "))
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ProxyError::invalid_request(
            "A non-empty text message is required for TTS.",
        ));
    }
    Ok((text, voice))
}
