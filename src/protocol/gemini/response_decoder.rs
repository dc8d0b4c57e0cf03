use super::classify::classify_candidate;
use super::{GeminiModalityTokenCount, GeminiResponse, GeminiUsageMetadata};
use crate::protocol::openai_chat::{
    OpenAiChatResponse, OpenAiChoice, OpenAiCompletionTokensDetails, OpenAiPromptTokensDetails,
    OpenAiUsage,
};
use crate::util::unix_now_secs;

/// Assemble a `chat.completion` from one complete upstream response.
///
/// A response without candidates but with a prompt block reason yields a
/// single `content_filter` choice with a `null` message.
#[must_use]
pub fn assemble_completion(response: GeminiResponse, id: &str, requested_model: &str) -> OpenAiChatResponse {
    let blocked = !response.has_candidates() && response.block_reason().is_some();
    if let Some(reason) = response.block_reason() {
        tracing::warn!(block_reason = reason, "prompt blocked upstream");
    }

    let mut choices: Vec<OpenAiChoice> = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .map(|candidate| {
            let fragments = classify_candidate(candidate);
            let index = fragments.index;
            let finish_reason = fragments.openai_finish_reason();
            OpenAiChoice {
                index,
                message: Some(fragments.into_message()),
                logprobs: None,
                finish_reason,
            }
        })
        .collect();

    if blocked {
        choices.push(blocked_choice());
    }

    OpenAiChatResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created: unix_now_secs(),
        model: response
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        choices,
        usage: response.usage_metadata.as_ref().map(map_usage),
    }
}

fn blocked_choice() -> OpenAiChoice {
    OpenAiChoice {
        index: 0,
        message: None,
        logprobs: None,
        finish_reason: Some("content_filter".to_string()),
    }
}

fn modality_tokens(details: Option<&Vec<GeminiModalityTokenCount>>, modality: &str) -> Option<u64> {
    details?
        .iter()
        .find(|entry| entry.modality == modality)
        .map(|entry| entry.token_count)
}

/// Map usage metadata. Reasoning tokens count towards completion tokens.
#[must_use]
pub fn map_usage(usage: &GeminiUsageMetadata) -> OpenAiUsage {
    let prompt_tokens = usage.prompt_token_count.unwrap_or(0);
    let completion_tokens =
        usage.candidates_token_count.unwrap_or(0) + usage.thoughts_token_count.unwrap_or(0);
    let total_tokens = usage
        .total_token_count
        .unwrap_or(prompt_tokens + completion_tokens);

    let prompt_details = OpenAiPromptTokensDetails {
        cached_tokens: usage.cached_content_token_count,
        audio_tokens: modality_tokens(usage.prompt_tokens_details.as_ref(), "AUDIO"),
    };
    let completion_details = OpenAiCompletionTokensDetails {
        reasoning_tokens: usage.thoughts_token_count,
        audio_tokens: modality_tokens(usage.candidates_tokens_details.as_ref(), "AUDIO"),
    };

    OpenAiUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        prompt_tokens_details: (prompt_details != OpenAiPromptTokensDetails::default())
            .then_some(prompt_details),
        completion_tokens_details: (completion_details
            != OpenAiCompletionTokensDetails::default())
        .then_some(completion_details),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn assemble(value: Value) -> Value {
        let response: GeminiResponse = serde_json::from_value(value).unwrap();
        serde_json::to_value(assemble_completion(response, "chatcmpl-test", "gemini-2.5-flash"))
            .unwrap()
    }

    #[test]
    fn test_single_candidate() {
        let out = assemble(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": "there"}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
            "modelVersion": "gemini-2.5-flash-001"
        }));
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["id"], "chatcmpl-test");
        assert_eq!(out["model"], "gemini-2.5-flash-001");
        let choice = &out["choices"][0];
        assert_eq!(choice["message"]["role"], "assistant");
        assert_eq!(choice["message"]["content"], "Hello\n\n|>there");
        assert_eq!(choice["finish_reason"], "stop");
        assert!(choice["logprobs"].is_null());
        assert_eq!(
            out["usage"],
            json!({"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6})
        );
    }

    #[test]
    fn test_multiple_candidates_keep_indices() {
        let out = assemble(json!({
            "candidates": [
                {"content": {"parts": [{"text": "A"}]}, "finishReason": "STOP", "index": 0},
                {"content": {"parts": [{"text": "B"}]}, "finishReason": "MAX_TOKENS", "index": 1}
            ]
        }));
        assert_eq!(out["choices"][1]["index"], 1);
        assert_eq!(out["choices"][1]["finish_reason"], "length");
        assert!(out.get("usage").is_none());
        assert_eq!(out["model"], "gemini-2.5-flash");
    }

    #[test]
    fn test_zero_candidates_with_safety_block() {
        let out = assemble(json!({
            "promptFeedback": {"blockReason": "SAFETY", "safetyRatings": [
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH", "blocked": true}
            ]},
            "usageMetadata": {"promptTokenCount": 9, "totalTokenCount": 9}
        }));
        let choices = out["choices"].as_array().unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0]["finish_reason"], "content_filter");
        assert!(choices[0]["message"].is_null());
        assert_eq!(choices[0]["index"], 0);
    }

    #[test]
    fn test_usage_breakdowns() {
        let usage: GeminiUsageMetadata = serde_json::from_value(json!({
            "promptTokenCount": 10,
            "candidatesTokenCount": 5,
            "thoughtsTokenCount": 7,
            "cachedContentTokenCount": 3,
            "totalTokenCount": 22,
            "promptTokensDetails": [{"modality": "TEXT", "tokenCount": 6}, {"modality": "AUDIO", "tokenCount": 4}]
        }))
        .unwrap();
        let value = serde_json::to_value(map_usage(&usage)).unwrap();
        assert_eq!(
            value,
            json!({
                "prompt_tokens": 10,
                "completion_tokens": 12,
                "total_tokens": 22,
                "prompt_tokens_details": {"cached_tokens": 3, "audio_tokens": 4},
                "completion_tokens_details": {"reasoning_tokens": 7}
            })
        );
    }

    #[test]
    fn test_usage_breakdowns_omitted_when_absent() {
        let usage: GeminiUsageMetadata = serde_json::from_value(json!({
            "promptTokenCount": 1,
            "candidatesTokenCount": 1
        }))
        .unwrap();
        let value = serde_json::to_value(map_usage(&usage)).unwrap();
        assert_eq!(
            value,
            json!({"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2})
        );
    }
}
