use serde_json::Value;

use super::generation::{adjust_schema, build_generation_config};
use super::media::{resolve_file_data, resolve_image_url, split_inline_images, MediaFetcher};
use super::registry::{upstream_call_id, FunctionCallRegistry};
use crate::error::ProxyError;
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionCallingConfig, GeminiFunctionDeclaration, GeminiPart,
    GeminiRequest, GeminiSafetySetting, GeminiTool, GeminiToolConfig,
};
use crate::protocol::mapping::{
    chat_role_to_gemini, openai_role, openai_tool_choice_mode_to_gemini, ChatRole,
};
use crate::protocol::openai_chat::{
    ContentPart, OpenAiChatRequest, OpenAiContent, OpenAiMessage, OpenAiToolCall,
    OpenAiToolChoice,
};
use crate::routing::model::ChatModel;

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// Encode an `OpenAI` chat request into a Gemini generateContent request.
///
/// Remote images are fetched through `fetcher`, one at a time in content order.
///
/// # Errors
///
/// Returns a 400 [`ProxyError`] for any malformed or unsupported request field.
pub async fn encode_gemini_request<F: MediaFetcher>(
    req: &OpenAiChatRequest,
    model: &ChatModel,
    fetcher: &F,
    safety_threshold: &str,
) -> Result<GeminiRequest, ProxyError> {
    let (system_instruction, contents) = encode_messages(&req.messages, fetcher).await?;
    let generation_config = build_generation_config(req, &model.name)?;

    let (mut tools, tool_config) = encode_tools(req)?;
    if model.google_search {
        tools
            .get_or_insert_with(Vec::new)
            .push(GeminiTool::google_search());
    }

    let google = req.extra_body.as_ref().and_then(|extra| extra.google.as_ref());
    let safety_settings = match google.and_then(|g| g.safety_settings.as_ref()) {
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
            ProxyError::invalid_request(format!("Invalid extra_body.google.safety_settings: {e}"))
        })?,
        None => default_safety_settings(safety_threshold),
    };

    Ok(GeminiRequest {
        contents,
        system_instruction,
        generation_config,
        safety_settings: Some(safety_settings),
        tools,
        tool_config,
        cached_content: google.and_then(|g| g.cached_content.clone()),
    })
}

#[must_use]
pub fn default_safety_settings(threshold: &str) -> Vec<GeminiSafetySetting> {
    SAFETY_CATEGORIES
        .iter()
        .map(|category| GeminiSafetySetting {
            category: (*category).to_string(),
            threshold: threshold.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MessageEncoder {
    system_parts: Vec<GeminiPart>,
    contents: Vec<GeminiContent>,
    /// Calls of the latest assistant turn, waiting for their results.
    pending_calls: Option<FunctionCallRegistry>,
    /// Results being collected for the synthetic `function` turn.
    function_turn: Option<FunctionCallRegistry>,
}

impl MessageEncoder {
    fn flush_function_turn(&mut self) {
        if let Some(registry) = self.function_turn.take() {
            let role = chat_role_to_gemini(ChatRole::Tool);
            self.contents
                .push(GeminiContent::new(role, registry.into_parts()));
        }
    }

    fn push_turn(&mut self, role: ChatRole, parts: Vec<GeminiPart>) {
        self.flush_function_turn();
        self.pending_calls = None;
        self.contents
            .push(GeminiContent::new(chat_role_to_gemini(role), parts));
    }

    fn push_tool_result(&mut self, msg: &OpenAiMessage) -> Result<(), ProxyError> {
        let registry = match self.function_turn.as_mut() {
            Some(registry) => registry,
            None => {
                let registry = self.pending_calls.take().ok_or_else(|| {
                    ProxyError::invalid_request("No function calls found in the previous message")
                })?;
                self.function_turn.insert(registry)
            }
        };
        let text = msg
            .content
            .as_ref()
            .map(|content| content.joined_text(""))
            .unwrap_or_default();
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProxyError::invalid_request(format!("Invalid function response: {e}")))?;
        registry.fill(msg.tool_call_id.as_deref(), value)
    }

    fn finish(mut self) -> (Option<GeminiContent>, Vec<GeminiContent>) {
        self.flush_function_turn();
        if self.system_parts.is_empty() {
            return (None, self.contents);
        }
        let first_has_text = self.contents.first().is_some_and(|content| {
            content
                .parts
                .iter()
                .any(|part| part.text.as_deref().is_some_and(|t| !t.is_empty()))
        });
        if !first_has_text {
            self.contents
                .insert(0, GeminiContent::new("user", vec![GeminiPart::text(" ")]));
        }
        let system = GeminiContent {
            role: None,
            parts: self.system_parts,
        };
        (Some(system), self.contents)
    }
}

async fn encode_messages<F: MediaFetcher>(
    messages: &[OpenAiMessage],
    fetcher: &F,
) -> Result<(Option<GeminiContent>, Vec<GeminiContent>), ProxyError> {
    let mut encoder = MessageEncoder::default();
    for msg in messages {
        match openai_role(&msg.role)? {
            ChatRole::System => {
                let parts = encode_content(msg.content.as_ref(), fetcher, false).await?;
                encoder.system_parts.extend(parts);
            }
            ChatRole::User => {
                let mut parts = encode_content(msg.content.as_ref(), fetcher, false).await?;
                if parts.is_empty() {
                    parts.push(GeminiPart::text(""));
                }
                encoder.push_turn(ChatRole::User, parts);
            }
            ChatRole::Assistant => {
                let mut parts = encode_content(msg.content.as_ref(), fetcher, true).await?;
                let calls = msg.tool_calls.as_deref().unwrap_or_default();
                if calls.is_empty() {
                    if parts.is_empty() {
                        parts.push(GeminiPart::text(""));
                    }
                    encoder.push_turn(ChatRole::Assistant, parts);
                    continue;
                }
                parts.retain(|part| part.text.as_deref() != Some(""));
                let registry = encode_tool_calls(calls, &mut parts)?;
                encoder.push_turn(ChatRole::Assistant, parts);
                encoder.pending_calls = Some(registry);
            }
            ChatRole::Tool => encoder.push_tool_result(msg)?,
        }
    }
    Ok(encoder.finish())
}

fn encode_tool_calls(
    calls: &[OpenAiToolCall],
    parts: &mut Vec<GeminiPart>,
) -> Result<FunctionCallRegistry, ProxyError> {
    let mut registry = FunctionCallRegistry::default();
    for call in calls {
        if call.type_ != "function" {
            return Err(ProxyError::invalid_request(format!(
                "Unsupported tool_call type: \"{}\"",
                call.type_
            )));
        }
        let raw = call.function.arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| {
                ProxyError::invalid_request(format!(
                    "Invalid function arguments for \"{}\": {e}",
                    call.function.name
                ))
            })?
        };
        parts.push(GeminiPart::function_call(
            upstream_call_id(&call.id),
            call.function.name.clone(),
            args,
        ));
        registry.register(&call.id, &call.function.name)?;
    }
    Ok(registry)
}

/// Encode message content. Assistant text is scanned for inline markdown images.
async fn encode_content<F: MediaFetcher>(
    content: Option<&OpenAiContent>,
    fetcher: &F,
    assistant: bool,
) -> Result<Vec<GeminiPart>, ProxyError> {
    let text_parts = |text: &str| {
        if assistant {
            split_inline_images(text)
        } else {
            vec![GeminiPart::text(text)]
        }
    };

    let items = match content {
        None => return Ok(Vec::new()),
        Some(OpenAiContent::Text(text)) => return Ok(text_parts(text)),
        Some(OpenAiContent::Parts(items)) => items,
    };

    let mut parts = Vec::with_capacity(items.len());
    let mut all_images = !items.is_empty();
    for item in items {
        let part = ContentPart::from_value(item)?;
        if !matches!(part, ContentPart::ImageUrl(_)) {
            all_images = false;
        }
        match part {
            ContentPart::Text(text) => parts.extend(text_parts(&text)),
            ContentPart::ImageUrl(url) => parts.push(resolve_image_url(&url, fetcher).await?),
            ContentPart::InputAudio { data, format } => {
                parts.push(GeminiPart::inline_data(format!("audio/{format}"), data));
            }
            ContentPart::File { file_data } => parts.push(resolve_file_data(&file_data)?),
        }
    }
    if all_images {
        parts.push(GeminiPart::text(""));
    }
    Ok(parts)
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

type EncodedTools = (Option<Vec<GeminiTool>>, Option<GeminiToolConfig>);

fn encode_tools(req: &OpenAiChatRequest) -> Result<EncodedTools, ProxyError> {
    let declarations: Vec<GeminiFunctionDeclaration> = req
        .tools
        .iter()
        .flatten()
        .filter(|tool| tool.type_ == "function")
        .filter_map(|tool| tool.function.as_ref())
        .map(|function| {
            let mut parameters = function.parameters.clone();
            if let Some(schema) = parameters.as_mut() {
                adjust_schema(schema);
            }
            GeminiFunctionDeclaration {
                name: function.name.clone(),
                description: function.description.clone(),
                parameters,
            }
        })
        .collect();

    let tools = (!declarations.is_empty()).then(|| {
        vec![GeminiTool {
            function_declarations: Some(declarations),
            ..GeminiTool::default()
        }]
    });

    let tool_config = match &req.tool_choice {
        None => None,
        Some(OpenAiToolChoice::Mode(mode)) => Some(GeminiToolConfig {
            function_calling_config: GeminiFunctionCallingConfig {
                mode: openai_tool_choice_mode_to_gemini(mode)?.to_string(),
                allowed_function_names: None,
            },
        }),
        Some(OpenAiToolChoice::Function(forced)) => {
            if forced.type_ != "function" {
                return Err(ProxyError::invalid_request(format!(
                    "Unsupported tool_choice type: \"{}\"",
                    forced.type_
                )));
            }
            Some(GeminiToolConfig {
                function_calling_config: GeminiFunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: Some(vec![forced.function.name.clone()]),
                },
            })
        }
    };

    Ok((tools, tool_config))
}
