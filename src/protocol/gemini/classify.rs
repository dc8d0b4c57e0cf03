//! Shared mapping from Gemini candidate parts to `OpenAI` message fields.
//!
//! Both the streaming and the non-streaming path run every candidate through
//! [`classify_candidate`], so content shapes cannot drift between them.

use serde_json::Value;

use super::media::inline_image_markdown;
use super::{GeminiCandidate, GeminiPart, PartKind};
use crate::protocol::mapping::gemini_finish_reason_to_openai;
use crate::protocol::openai_chat::{
    OpenAiDelta, OpenAiResponseMessage, OpenAiToolCall, OpenAiToolCallFunction,
};
use crate::util::next_call_id;

/// Joins text pieces of one candidate in a complete response.
pub const NON_STREAM_TEXT_SEPARATOR: &str = "\n\n|>";
/// Joins text pieces within one stream event.
pub const STREAM_TEXT_SEPARATOR: &str = "";

/// Everything one candidate (or one stream event of it) contributed.
#[derive(Debug, Clone, Default)]
pub struct CandidateFragments {
    pub index: u32,
    pub text: Vec<String>,
    pub reasoning: Vec<String>,
    pub tool_calls: Vec<OpenAiToolCall>,
    pub grounding_metadata: Option<Value>,
    pub url_context_metadata: Option<Value>,
    /// Raw upstream value.
    pub finish_reason: Option<String>,
}

#[must_use]
pub fn classify_candidate(candidate: GeminiCandidate) -> CandidateFragments {
    let mut out = CandidateFragments {
        index: candidate.index.unwrap_or(0),
        grounding_metadata: candidate.grounding_metadata,
        url_context_metadata: candidate.url_context_metadata,
        finish_reason: candidate.finish_reason,
        ..CandidateFragments::default()
    };
    for part in candidate.content.iter().flat_map(|content| &content.parts) {
        classify_part(part, &mut out);
    }
    out
}

pub fn classify_part(part: &GeminiPart, out: &mut CandidateFragments) {
    match part.kind() {
        PartKind::Text(text) => {
            if !text.is_empty() {
                out.text.push(text.to_string());
            }
        }
        PartKind::Thought(text) => {
            if !text.is_empty() {
                out.reasoning.push(text.to_string());
            }
        }
        PartKind::FunctionCall(call) => {
            let arguments = if call.args.is_null() {
                "{}".to_string()
            } else {
                call.args.to_string()
            };
            out.tool_calls.push(OpenAiToolCall {
                index: None,
                id: call.id.clone().unwrap_or_else(next_call_id),
                type_: "function".to_string(),
                function: OpenAiToolCallFunction {
                    name: call.name.clone(),
                    arguments,
                },
            });
        }
        PartKind::InlineData(blob) => out.text.push(inline_image_markdown(blob)),
        PartKind::ExecutableCode(code) => out.text.push(format!(
            "```{}\n{}\n```",
            code.language.to_lowercase(),
            code.code
        )),
        PartKind::CodeExecutionResult(result) => {
            out.text.push(format!("```output\n{}\n```", result.output));
        }
        PartKind::FunctionResponse(response) => {
            tracing::debug!(name = %response.name, "ignoring echoed function response part");
        }
        PartKind::Unrecognized => {
            let keys: Vec<&str> = part
                .extra
                .keys()
                .map(String::as_str)
                .filter(|key| *key != "thoughtSignature")
                .collect();
            if !keys.is_empty() {
                tracing::warn!(?keys, "skipping unrecognized upstream part");
            }
        }
    }
}

impl CandidateFragments {
    /// Joined text, or `None` when there is none.
    #[must_use]
    pub fn content(&self, separator: &str) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        Some(self.text.join(separator)).filter(|joined| !joined.is_empty())
    }

    #[must_use]
    pub fn reasoning_content(&self) -> Option<String> {
        if self.reasoning.is_empty() {
            return None;
        }
        Some(self.reasoning.concat())
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    #[must_use]
    pub fn openai_finish_reason(&self) -> Option<String> {
        gemini_finish_reason_to_openai(self.finish_reason.as_deref(), self.has_tool_calls())
    }

    #[must_use]
    pub fn into_message(self) -> OpenAiResponseMessage {
        OpenAiResponseMessage {
            role: "assistant".to_string(),
            content: self.content(NON_STREAM_TEXT_SEPARATOR),
            reasoning_content: self.reasoning_content(),
            tool_calls: (!self.tool_calls.is_empty()).then_some(self.tool_calls),
            grounding_metadata: self.grounding_metadata,
            url_context_metadata: self.url_context_metadata,
            audio: None,
        }
    }

    /// Delta for one stream event. Tool calls are numbered from `first_tool_index`.
    #[must_use]
    pub fn into_delta(self, first_tool_index: u32) -> OpenAiDelta {
        let content = self.content(STREAM_TEXT_SEPARATOR);
        let reasoning_content = self.reasoning_content();
        let tool_calls = (!self.tool_calls.is_empty()).then(|| {
            self.tool_calls
                .into_iter()
                .zip(first_tool_index..)
                .map(|(call, index)| OpenAiToolCall {
                    index: Some(index),
                    ..call
                })
                .collect()
        });
        OpenAiDelta {
            role: None,
            content,
            reasoning_content,
            tool_calls,
            grounding_metadata: self.grounding_metadata,
            url_context_metadata: self.url_context_metadata,
        }
    }
}
