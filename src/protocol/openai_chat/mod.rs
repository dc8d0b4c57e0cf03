use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProxyError;

/// `OpenAI` Chat Completion request wire type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<OpenAiToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAiResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<OpenAiStop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<OpenAiAudioOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_body: Option<OpenAiExtraBody>,
}

impl OpenAiChatRequest {
    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    #[must_use]
    pub fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .and_then(|opts| opts.include_usage)
            .unwrap_or(false)
    }

    /// Whether the client asked for spoken output instead of text.
    #[must_use]
    pub fn wants_audio(&self) -> bool {
        self.modalities
            .as_ref()
            .is_some_and(|m| m.iter().any(|modality| modality == "audio"))
    }
}

/// `tool_choice` field in `OpenAI` Chat requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiToolChoice {
    Mode(String),
    Function(OpenAiToolChoiceFunctionCall),
}

/// `tool_choice` object form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolChoiceFunctionCall {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: OpenAiToolChoiceFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolChoiceFunction {
    pub name: String,
}

/// `stop` field in `OpenAI` Chat requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiStop {
    Single(String),
    Multi(Vec<String>),
}

impl OpenAiStop {
    #[must_use]
    pub fn into_sequences(self) -> Vec<String> {
        match self {
            OpenAiStop::Single(s) => vec![s],
            OpenAiStop::Multi(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// `response_format` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponseFormat {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<OpenAiJsonSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiJsonSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// `audio` output options, used together with `modalities: ["audio"]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiAudioOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Vendor passthrough block. Only the `google` key is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiExtraBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleExtensions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleExtensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<Value>,
}

/// `OpenAI` request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content: a bare string or a list of typed parts.
///
/// Parts stay as raw JSON until [`ContentPart::from_value`] so that an unknown
/// `type` surfaces as a request error naming the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<Value>),
}

impl OpenAiContent {
    /// All textual pieces, joined with `sep`.
    #[must_use]
    pub fn joined_text(&self, sep: &str) -> String {
        match self {
            OpenAiContent::Text(s) => s.clone(),
            OpenAiContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p.get("type").and_then(Value::as_str), Some("text" | "input_text")))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(sep),
        }
    }
}

/// One typed element of a multi-part message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// `http(s)://` URL or `data:` URI.
    ImageUrl(String),
    InputAudio { data: String, format: String },
    /// `data:` URI or bare base64.
    File { file_data: String },
}

#[derive(Deserialize)]
struct TextPartWire {
    text: String,
}

#[derive(Deserialize)]
struct ImageUrlPartWire {
    image_url: ImageUrlWire,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageUrlWire {
    Object { url: String },
    Bare(String),
}

#[derive(Deserialize)]
struct InputAudioPartWire {
    input_audio: InputAudioWire,
}

#[derive(Deserialize)]
struct InputAudioWire {
    data: String,
    format: String,
}

#[derive(Deserialize)]
struct InputFilePartWire {
    file_data: String,
}

#[derive(Deserialize)]
struct FilePartWire {
    file: InputFilePartWire,
}

fn decode_part<T: serde::de::DeserializeOwned>(kind: &str, value: &Value) -> Result<T, ProxyError> {
    T::deserialize(value)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid \"{kind}\" content item: {e}")))
}

impl ContentPart {
    /// Parse one element of a `content` array.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ProxyError`] for an unknown `type` or a malformed item.
    pub fn from_value(value: &Value) -> Result<Self, ProxyError> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "text" | "input_text" => {
                decode_part::<TextPartWire>(kind, value).map(|p| ContentPart::Text(p.text))
            }
            "image_url" => decode_part::<ImageUrlPartWire>(kind, value).map(|p| {
                ContentPart::ImageUrl(match p.image_url {
                    ImageUrlWire::Object { url } | ImageUrlWire::Bare(url) => url,
                })
            }),
            "input_audio" => decode_part::<InputAudioPartWire>(kind, value).map(|p| {
                ContentPart::InputAudio {
                    data: p.input_audio.data,
                    format: p.input_audio.format,
                }
            }),
            "input_file" => decode_part::<InputFilePartWire>(kind, value).map(|p| {
                ContentPart::File {
                    file_data: p.file_data,
                }
            }),
            "file" => decode_part::<FilePartWire>(kind, value).map(|p| ContentPart::File {
                file_data: p.file.file_data,
            }),
            other => Err(ProxyError::invalid_request(format!(
                "Unknown \"content\" item type: \"{other}\""
            ))),
        }
    }
}

/// A tool call within a message or delta. `index` is only set in stream deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub type_: String,
    pub function: OpenAiToolCallFunction,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAiToolFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// `chat.completion` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

/// `message` is `null` for a blocked prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: Option<OpenAiResponseMessage>,
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiResponseMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_context_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<OpenAiAudioOutput>,
}

/// Spoken output attached to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiAudioOutput {
    pub format: String,
    /// Base64 of the encoded audio.
    pub data: String,
    pub transcript: String,
}

/// Usage info. Detail objects are omitted when none of their members is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<OpenAiPromptTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<OpenAiCompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiPromptTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiCompletionTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u64>,
}

/// `chat.completion.chunk` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

/// `delta` is `null` only on the synthesized blocked-prompt chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiStreamChoice {
    pub index: u32,
    pub delta: Option<OpenAiDelta>,
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_context_metadata: Option<Value>,
}

impl OpenAiDelta {
    /// The opening delta every candidate starts with.
    #[must_use]
    pub fn open() -> Self {
        Self {
            role: Some("assistant".to_string()),
            content: Some(String::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_accepts_minimal_body() {
        let req: OpenAiChatRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert!(req.model.is_none());
        assert!(!req.is_stream());
        assert!(!req.include_usage());
        assert!(!req.wants_audio());
    }

    #[test]
    fn test_stream_options_and_modalities() {
        let req: OpenAiChatRequest = serde_json::from_value(json!({
            "model": "gemini-2.5-flash",
            "messages": [],
            "stream": true,
            "stream_options": {"include_usage": true},
            "modalities": ["text", "audio"],
            "audio": {"voice": "Kore", "format": "wav"}
        }))
        .unwrap();
        assert!(req.is_stream());
        assert!(req.include_usage());
        assert!(req.wants_audio());
        assert_eq!(req.audio.unwrap().voice.as_deref(), Some("Kore"));
    }

    #[test]
    fn test_stop_normalizes_to_list() {
        let single: OpenAiStop = serde_json::from_value(json!("END")).unwrap();
        assert_eq!(single.into_sequences(), vec!["END".to_string()]);
        let multi: OpenAiStop = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(multi.into_sequences().len(), 2);
    }

    #[test]
    fn test_content_part_kinds() {
        assert_eq!(
            ContentPart::from_value(&json!({"type": "input_text", "text": "x"})).unwrap(),
            ContentPart::Text("x".into())
        );
        assert_eq!(
            ContentPart::from_value(&json!({"type": "image_url", "image_url": {"url": "https://a/b.png"}}))
                .unwrap(),
            ContentPart::ImageUrl("https://a/b.png".into())
        );
        assert_eq!(
            ContentPart::from_value(&json!({"type": "input_audio", "input_audio": {"data": "AA==", "format": "mp3"}}))
                .unwrap(),
            ContentPart::InputAudio {
                data: "AA==".into(),
                format: "mp3".into()
            }
        );
        assert_eq!(
            ContentPart::from_value(&json!({"type": "file", "file": {"file_data": "JVBE"}})).unwrap(),
            ContentPart::File {
                file_data: "JVBE".into()
            }
        );
    }

    #[test]
    fn test_unknown_content_part_type_is_rejected() {
        match ContentPart::from_value(&json!({"type": "video_url", "video_url": "x"})) {
            Err(ProxyError::Validation { message, .. }) => {
                assert!(message.contains("video_url"), "{message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_joined_text_skips_non_text_parts() {
        let content: OpenAiContent = serde_json::from_value(json!([
            {"type": "text", "text": "Hello"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AA=="}},
            {"type": "text", "text": "world"}
        ]))
        .unwrap();
        assert_eq!(content.joined_text(" "), "Hello world");
    }

    #[test]
    fn test_open_delta_shape() {
        let value = serde_json::to_value(OpenAiDelta::open()).unwrap();
        assert_eq!(value, json!({"role": "assistant", "content": ""}));
        assert!(OpenAiDelta::default().is_empty());
    }

    #[test]
    fn test_blocked_choice_serializes_null_message() {
        let choice = OpenAiChoice {
            index: 0,
            message: None,
            logprobs: None,
            finish_reason: Some("content_filter".into()),
        };
        let value = serde_json::to_value(choice).unwrap();
        assert!(value["message"].is_null());
        assert!(value["logprobs"].is_null());
    }
}
