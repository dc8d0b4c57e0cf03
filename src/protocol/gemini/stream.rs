//! Gemini stream events to `chat.completion.chunk` deltas.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::classify::classify_candidate;
use super::response_decoder::map_usage;
use super::GeminiResponse;
use crate::protocol::mapping::gemini_finish_reason_to_openai;
use crate::protocol::openai_chat::{OpenAiDelta, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiUsage};
use crate::stream::SseFrame;
use crate::util::unix_now_secs;

pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePhase {
    Streaming,
    /// A finish reason was seen; the finish chunk is held until the stream ends.
    Finished,
}

/// Per-candidate stream state. A candidate absent from the map has not started.
#[derive(Debug, Clone)]
pub struct CandidateState {
    pub phase: CandidatePhase,
    /// Last non-null upstream finish reason.
    pub finish_reason: Option<String>,
    pub saw_tool_calls: bool,
    pub next_tool_index: u32,
}

impl CandidateState {
    fn new() -> Self {
        Self {
            phase: CandidatePhase::Streaming,
            finish_reason: None,
            saw_tool_calls: false,
            next_tool_index: 0,
        }
    }
}

/// Stateful encoder for one streamed completion.
pub struct DeltaSynthesizer {
    id: String,
    model: String,
    include_usage: bool,
    candidates: BTreeMap<u32, CandidateState>,
    usage: Option<OpenAiUsage>,
    blocked: bool,
    done: bool,
}

impl DeltaSynthesizer {
    #[must_use]
    pub fn new(id: String, model: String, include_usage: bool) -> Self {
        Self {
            id,
            model,
            include_usage,
            candidates: BTreeMap::new(),
            usage: None,
            blocked: false,
            done: false,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Last usage reported upstream, if any.
    #[must_use]
    pub fn usage(&self) -> Option<&OpenAiUsage> {
        self.usage.as_ref()
    }

    /// Translate one upstream frame into zero or more client frames.
    pub fn push_frame(&mut self, frame: &SseFrame, out: &mut Vec<Bytes>) {
        let response = match serde_json::from_str::<GeminiResponse>(&frame.data) {
            Ok(response) if response.candidates.is_some() || response.block_reason().is_some() => {
                response
            }
            Ok(_) | Err(_) => {
                tracing::debug!(
                    truncated = frame.truncated,
                    bytes = frame.data.len(),
                    "forwarding undecodable stream payload"
                );
                forward_raw(frame, out);
                return;
            }
        };
        self.push_response(response, out);
    }

    fn push_response(&mut self, response: GeminiResponse, out: &mut Vec<Bytes>) {
        if let Some(model) = &response.model_version {
            self.model.clone_from(model);
        }
        if let Some(reason) = response.block_reason() {
            tracing::warn!(block_reason = reason, "prompt blocked upstream");
            self.blocked = true;
        }
        if let Some(usage) = &response.usage_metadata {
            self.usage = Some(map_usage(usage));
        }

        for candidate in response.candidates.unwrap_or_default() {
            let fragments = classify_candidate(candidate);
            let index = fragments.index;
            let mut opened = false;
            let state = self.candidates.entry(index).or_insert_with(|| {
                opened = true;
                CandidateState::new()
            });
            if let Some(reason) = &fragments.finish_reason {
                state.finish_reason = Some(reason.clone());
                state.phase = CandidatePhase::Finished;
            }
            let first_tool_index = state.next_tool_index;
            if fragments.has_tool_calls() {
                state.saw_tool_calls = true;
                let added = u32::try_from(fragments.tool_calls.len()).unwrap_or(u32::MAX);
                state.next_tool_index = state.next_tool_index.saturating_add(added);
            }

            if opened {
                self.emit(index, Some(OpenAiDelta::open()), None, false, out);
            }
            let delta = fragments.into_delta(first_tool_index);
            if !delta.is_empty() {
                self.emit(index, Some(delta), None, false, out);
            }
        }
    }

    /// Emit the deferred finish chunks and the `[DONE]` sentinel.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if self.done {
            return;
        }
        self.done = true;

        let finished: Vec<(u32, Option<String>)> = self
            .candidates
            .iter()
            .filter(|(_, state)| state.phase == CandidatePhase::Finished)
            .map(|(index, state)| {
                (
                    *index,
                    gemini_finish_reason_to_openai(
                        state.finish_reason.as_deref(),
                        state.saw_tool_calls,
                    ),
                )
            })
            .collect();
        for (index, finish_reason) in finished {
            self.emit(index, Some(OpenAiDelta::default()), finish_reason, true, out);
        }

        if self.blocked && self.candidates.is_empty() {
            self.emit(0, None, Some("content_filter".to_string()), true, out);
        }
        out.push(Bytes::from_static(DONE_FRAME));
    }

    fn emit(
        &self,
        index: u32,
        delta: Option<OpenAiDelta>,
        finish_reason: Option<String>,
        with_usage: bool,
        out: &mut Vec<Bytes>,
    ) {
        let chunk = OpenAiStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now_secs(),
            model: self.model.clone(),
            choices: vec![OpenAiStreamChoice {
                index,
                delta,
                logprobs: None,
                finish_reason,
            }],
            usage: if with_usage && self.include_usage {
                self.usage.clone()
            } else {
                None
            },
        };
        match serde_json::to_vec(&chunk) {
            Ok(json) => {
                let mut frame = Vec::with_capacity(json.len() + 8);
                frame.extend_from_slice(b"data: ");
                frame.extend_from_slice(&json);
                frame.extend_from_slice(b"\n\n");
                out.push(Bytes::from(frame));
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize stream chunk"),
        }
    }
}

fn forward_raw(frame: &SseFrame, out: &mut Vec<Bytes>) {
    let mut raw = frame.data.clone().into_bytes();
    if !frame.truncated {
        raw.extend_from_slice(b"\n\n");
    }
    out.push(Bytes::from(raw));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn frame(value: &Value) -> SseFrame {
        SseFrame {
            data: value.to_string(),
            truncated: false,
        }
    }

    fn run(events: &[Value], include_usage: bool) -> Vec<String> {
        let mut synth = DeltaSynthesizer::new(
            "chatcmpl-test".to_string(),
            "gemini-2.5-flash".to_string(),
            include_usage,
        );
        let mut out = Vec::new();
        for event in events {
            synth.push_frame(&frame(event), &mut out);
        }
        synth.finish(&mut out);
        out.into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    fn chunk(frame: &str) -> Value {
        let body = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap_or_else(|| panic!("expected data frame, got {frame:?}"));
        serde_json::from_str(body).unwrap()
    }

    fn text_event(index: u32, text: &str, finish: Option<&str>) -> Value {
        let mut candidate = json!({
            "index": index,
            "content": {"role": "model", "parts": [{"text": text}]}
        });
        if let Some(finish) = finish {
            candidate["finishReason"] = json!(finish);
        }
        json!({"candidates": [candidate], "modelVersion": "gemini-2.5-flash-001"})
    }

    #[test]
    fn test_single_candidate_framing() {
        let frames = run(
            &[
                text_event(0, "Hel", None),
                text_event(0, "lo", Some("STOP")),
            ],
            false,
        );
        assert_eq!(frames.len(), 5);
        let open = chunk(&frames[0]);
        assert_eq!(
            open["choices"][0]["delta"],
            json!({"role": "assistant", "content": ""})
        );
        assert_eq!(open["object"], "chat.completion.chunk");
        assert_eq!(open["model"], "gemini-2.5-flash-001");
        assert!(open["choices"][0]["finish_reason"].is_null());
        assert!(open["choices"][0]["logprobs"].is_null());

        assert_eq!(chunk(&frames[1])["choices"][0]["delta"], json!({"content": "Hel"}));
        let second = chunk(&frames[2]);
        assert_eq!(second["choices"][0]["delta"], json!({"content": "lo"}));
        assert!(second["choices"][0]["finish_reason"].is_null());

        let last = chunk(&frames[3]);
        assert_eq!(last["choices"][0]["delta"], json!({}));
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
        assert!(last.get("usage").is_none());
        assert_eq!(frames[4], "data: [DONE]\n\n");
    }

    #[test]
    fn test_stream_concatenates_parts_without_separator() {
        let event = json!({"candidates": [{
            "content": {"parts": [{"text": "a"}, {"text": "b"}]},
            "finishReason": "STOP"
        }]});
        let frames = run(&[event], false);
        assert_eq!(chunk(&frames[1])["choices"][0]["delta"]["content"], "ab");
    }

    #[test]
    fn test_each_candidate_finishes_exactly_once_and_last() {
        let frames = run(
            &[
                json!({"candidates": [
                    {"index": 1, "content": {"parts": [{"text": "one"}]}},
                    {"index": 0, "content": {"parts": [{"text": "zero"}]}}
                ]}),
                json!({"candidates": [
                    {"index": 0, "content": {"parts": [{"text": "!"}]}, "finishReason": "MAX_TOKENS"},
                    {"index": 1, "content": {"parts": []}, "finishReason": "STOP"}
                ]}),
            ],
            false,
        );
        let chunks: Vec<Value> = frames[..frames.len() - 1].iter().map(|f| chunk(f)).collect();
        for index in [0, 1] {
            let own: Vec<&Value> = chunks
                .iter()
                .filter(|c| c["choices"][0]["index"] == index)
                .collect();
            assert_eq!(
                own[0]["choices"][0]["delta"],
                json!({"role": "assistant", "content": ""})
            );
            let finishes: Vec<usize> = own
                .iter()
                .enumerate()
                .filter(|(_, c)| !c["choices"][0]["finish_reason"].is_null())
                .map(|(pos, _)| pos)
                .collect();
            assert_eq!(finishes, vec![own.len() - 1]);
        }
        let tail: Vec<(u64, String)> = chunks[chunks.len() - 2..]
            .iter()
            .map(|c| {
                (
                    c["choices"][0]["index"].as_u64().unwrap(),
                    c["choices"][0]["finish_reason"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            tail,
            vec![(0, "length".to_string()), (1, "stop".to_string())]
        );
    }

    #[test]
    fn test_tool_calls_are_indexed_per_candidate() {
        let call = |name: &str| {
            json!({"candidates": [{"content": {"parts": [
                {"functionCall": {"name": name, "args": {"q": name}}}
            ]}}]})
        };
        let mut finish = call("c");
        finish["candidates"][0]["finishReason"] = json!("STOP");
        let frames = run(&[call("a"), call("b"), finish], false);

        let indexes: Vec<u64> = frames
            .iter()
            .filter(|f| f.starts_with("data: {"))
            .map(|f| chunk(f))
            .filter_map(|c| c["choices"][0]["delta"]["tool_calls"][0]["index"].as_u64())
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        let tool_chunk = chunk(&frames[1]);
        let call = &tool_chunk["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "a");
        assert_eq!(call["function"]["arguments"], "{\"q\":\"a\"}");
        assert!(call["id"].as_str().unwrap().starts_with("call_"));

        let last = chunk(&frames[frames.len() - 2]);
        assert_eq!(last["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn test_reasoning_and_metadata_deltas() {
        let frames = run(
            &[json!({"candidates": [{
                "content": {"parts": [{"text": "hmm", "thought": true}]},
                "groundingMetadata": {"webSearchQueries": ["rust"]}
            }]})],
            false,
        );
        let delta = &chunk(&frames[1])["choices"][0]["delta"];
        assert_eq!(delta["reasoning_content"], "hmm");
        assert_eq!(delta["grounding_metadata"]["webSearchQueries"][0], "rust");
        assert!(delta.get("content").is_none());
        // Unfinished candidates get no finish chunk.
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], "data: [DONE]\n\n");
    }

    #[test]
    fn test_usage_is_attached_only_when_requested() {
        let mut event = text_event(0, "hi", Some("STOP"));
        event["usageMetadata"] = json!({
            "promptTokenCount": 3,
            "candidatesTokenCount": 2,
            "thoughtsTokenCount": 4,
            "totalTokenCount": 9
        });
        let with = run(&[event.clone()], true);
        let last = chunk(&with[with.len() - 2]);
        assert_eq!(last["usage"]["prompt_tokens"], 3);
        assert_eq!(last["usage"]["completion_tokens"], 6);
        assert_eq!(last["usage"]["total_tokens"], 9);
        assert!(chunk(&with[1]).get("usage").is_none());

        let without = run(&[event], false);
        assert!(chunk(&without[without.len() - 2]).get("usage").is_none());
    }

    #[test]
    fn test_blocked_prompt_yields_content_filter_chunk() {
        let frames = run(
            &[json!({"promptFeedback": {"blockReason": "SAFETY"}})],
            false,
        );
        assert_eq!(frames.len(), 2);
        let blocked = chunk(&frames[0]);
        assert_eq!(blocked["choices"][0]["index"], 0);
        assert!(blocked["choices"][0]["delta"].is_null());
        assert_eq!(blocked["choices"][0]["finish_reason"], "content_filter");
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }

    #[test]
    fn test_undecodable_payloads_are_forwarded() {
        let mut synth =
            DeltaSynthesizer::new("chatcmpl-x".to_string(), "m".to_string(), false);
        let mut out = Vec::new();
        synth.push_frame(
            &SseFrame {
                data: "not json".to_string(),
                truncated: false,
            },
            &mut out,
        );
        synth.push_frame(
            &SseFrame {
                data: "{\"error\":{\"code\":500}}".to_string(),
                truncated: false,
            },
            &mut out,
        );
        synth.push_frame(
            &SseFrame {
                data: "data: {\"cand".to_string(),
                truncated: true,
            },
            &mut out,
        );
        assert_eq!(out[0], Bytes::from_static(b"not json\n\n"));
        assert_eq!(out[1], Bytes::from_static(b"{\"error\":{\"code\":500}}\n\n"));
        assert_eq!(out[2], Bytes::from_static(b"data: {\"cand"));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut synth =
            DeltaSynthesizer::new("chatcmpl-x".to_string(), "m".to_string(), false);
        let mut out = Vec::new();
        synth.finish(&mut out);
        synth.finish(&mut out);
        assert_eq!(out, vec![Bytes::from_static(DONE_FRAME)]);
    }
}
