use serde_json::Value;

use super::{GeminiGenerationConfig, GeminiThinkingConfig};
use crate::error::ProxyError;
use crate::protocol::openai_chat::{OpenAiChatRequest, OpenAiResponseFormat};

/// Thinking budgets per `reasoning_effort`.
const THINKING_BUDGET_LOW: u32 = 1024;
const THINKING_BUDGET_MEDIUM: u32 = 8192;
const THINKING_BUDGET_HIGH: u32 = 24576;
/// Low effort on models that can switch thinking off.
const THINKING_BUDGET_LOW_NON_PRO: u32 = 0;

/// Map sampling fields, `response_format` and `reasoning_effort`.
///
/// Returns `None` when nothing needs to be sent.
///
/// # Errors
///
/// Returns a 400 [`ProxyError`] for an unknown response format type, an
/// unknown reasoning effort, or a malformed `extra_body.google.thinking_config`.
pub fn build_generation_config(
    req: &OpenAiChatRequest,
    model: &str,
) -> Result<Option<GeminiGenerationConfig>, ProxyError> {
    let mut config = GeminiGenerationConfig {
        frequency_penalty: req.frequency_penalty,
        presence_penalty: req.presence_penalty,
        max_output_tokens: req.max_completion_tokens.or(req.max_tokens),
        candidate_count: req.n,
        seed: req.seed,
        stop_sequences: req.stop.clone().map(|stop| stop.into_sequences()),
        temperature: req.temperature,
        top_k: req.top_k,
        top_p: req.top_p,
        ..GeminiGenerationConfig::default()
    };

    if let Some(format) = &req.response_format {
        apply_response_format(&mut config, format)?;
    }

    if let Some(effort) = req.reasoning_effort.as_deref() {
        config.thinking_config = Some(GeminiThinkingConfig {
            thinking_budget: Some(thinking_budget(effort, model)?),
            ..GeminiThinkingConfig::default()
        });
    }

    let thinking_override = req
        .extra_body
        .as_ref()
        .and_then(|extra| extra.google.as_ref())
        .and_then(|google| google.thinking_config.as_ref());
    if let Some(raw) = thinking_override {
        let parsed = GeminiThinkingConfig::deserialize_camel_or_snake(raw)?;
        config.thinking_config = Some(parsed);
    }

    if config == GeminiGenerationConfig::default() {
        return Ok(None);
    }
    Ok(Some(config))
}

impl GeminiThinkingConfig {
    /// Accepts both `thinking_budget` and `thinkingBudget` spellings.
    fn deserialize_camel_or_snake(raw: &Value) -> Result<Self, ProxyError> {
        let Some(map) = raw.as_object() else {
            return Err(ProxyError::invalid_request(
                "extra_body.google.thinking_config must be an object",
            ));
        };
        let normalized: serde_json::Map<String, Value> = map
            .iter()
            .map(|(key, value)| (snake_to_camel(key), value.clone()))
            .collect();
        serde_json::from_value(Value::Object(normalized)).map_err(|e| {
            ProxyError::invalid_request(format!("Invalid extra_body.google.thinking_config: {e}"))
        })
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn apply_response_format(
    config: &mut GeminiGenerationConfig,
    format: &OpenAiResponseFormat,
) -> Result<(), ProxyError> {
    match format.type_.as_str() {
        "json_schema" => {
            let schema = format
                .json_schema
                .as_ref()
                .and_then(|wrapper| wrapper.schema.clone());
            match schema {
                Some(mut schema) => {
                    adjust_schema(&mut schema);
                    let mime = if schema.get("enum").is_some() {
                        "text/x.enum"
                    } else {
                        "application/json"
                    };
                    config.response_schema = Some(schema);
                    config.response_mime_type = Some(mime.to_string());
                }
                None => config.response_mime_type = Some("application/json".to_string()),
            }
        }
        "json_object" => config.response_mime_type = Some("application/json".to_string()),
        "text" => config.response_mime_type = Some("text/plain".to_string()),
        other => {
            return Err(ProxyError::invalid_request(format!(
                "Unsupported response_format.type: \"{other}\""
            )))
        }
    }
    Ok(())
}

/// Drop what the upstream schema dialect rejects: `additionalProperties: false`
/// on object nodes with `properties`, and boolean `strict` flags. Applied recursively.
pub fn adjust_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if map.get("strict").is_some_and(Value::is_boolean) {
                map.remove("strict");
            }
            if map.contains_key("properties")
                && map.get("additionalProperties") == Some(&Value::Bool(false))
            {
                map.remove("additionalProperties");
            }
            for value in map.values_mut() {
                adjust_schema(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                adjust_schema(item);
            }
        }
        _ => {}
    }
}

fn thinking_budget(effort: &str, model: &str) -> Result<u32, ProxyError> {
    match effort {
        "low" if model.contains("pro") => Ok(THINKING_BUDGET_LOW),
        "low" => Ok(THINKING_BUDGET_LOW_NON_PRO),
        "medium" => Ok(THINKING_BUDGET_MEDIUM),
        "high" => Ok(THINKING_BUDGET_HIGH),
        other => Err(ProxyError::invalid_request(format!(
            "Unsupported reasoning_effort: \"{other}\""
        ))),
    }
}
