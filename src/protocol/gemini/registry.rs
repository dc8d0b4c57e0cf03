use std::collections::HashMap;

use serde_json::Value;

use super::GeminiPart;
use crate::error::ProxyError;

#[derive(Debug, Clone)]
struct CallSlot {
    position: usize,
    name: String,
}

/// Positional slots for the function results that answer one assistant turn.
///
/// Built from the turn's `tool_calls`; each `tool` message fills the slot of
/// its `tool_call_id`, so results land in call order whatever order they
/// arrive in.
#[derive(Debug, Default)]
pub struct FunctionCallRegistry {
    slots: HashMap<String, CallSlot>,
    responses: Vec<Option<GeminiPart>>,
}

impl FunctionCallRegistry {
    /// Open a slot for one tool call.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ProxyError`] when `id` already names a call in this turn.
    pub fn register(&mut self, id: &str, name: &str) -> Result<(), ProxyError> {
        if self.slots.contains_key(id) {
            return Err(ProxyError::invalid_request(format!(
                "Duplicated tool_call id: \"{id}\""
            )));
        }
        let position = self.responses.len();
        self.responses.push(None);
        self.slots.insert(
            id.to_string(),
            CallSlot {
                position,
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// Place one tool result.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`ProxyError`] when the id is missing, unknown, or was
    /// already answered.
    pub fn fill(&mut self, tool_call_id: Option<&str>, response: Value) -> Result<(), ProxyError> {
        let id = tool_call_id
            .ok_or_else(|| ProxyError::invalid_request("tool_call_id not specified"))?;
        let slot = self.slots.get(id).ok_or_else(|| {
            ProxyError::invalid_request(format!("Unknown tool_call_id: \"{id}\""))
        })?;
        let entry = &mut self.responses[slot.position];
        if entry.is_some() {
            return Err(ProxyError::invalid_request(format!(
                "Duplicated tool_call_id: \"{id}\""
            )));
        }
        let upstream_id = upstream_call_id(id);
        *entry = Some(GeminiPart::function_response(
            upstream_id,
            slot.name.clone(),
            wrap_response(response),
        ));
        Ok(())
    }

    /// Filled slots in call order. Unanswered calls are dropped.
    #[must_use]
    pub fn into_parts(self) -> Vec<GeminiPart> {
        let total = self.responses.len();
        let parts: Vec<GeminiPart> = self.responses.into_iter().flatten().collect();
        if parts.len() < total {
            tracing::debug!(
                answered = parts.len(),
                total,
                "tool calls left without a result"
            );
        }
        parts
    }
}

/// Ids with the `call_` prefix were minted locally and mean nothing upstream.
#[must_use]
pub fn upstream_call_id(id: &str) -> Option<String> {
    if id.starts_with("call_") || id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn wrap_response(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        serde_json::json!({ "result": value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FunctionCallRegistry {
        let mut registry = FunctionCallRegistry::default();
        registry.register("call_a", "get_weather").unwrap();
        registry.register("call_b", "get_time").unwrap();
        registry
    }

    fn response_names(parts: &[GeminiPart]) -> Vec<&str> {
        parts
            .iter()
            .map(|p| p.function_response.as_ref().unwrap().name.as_str())
            .collect()
    }

    #[test]
    fn test_results_are_slotted_by_id() {
        let mut registry = registry();
        registry.fill(Some("call_b"), json!({"time": "noon"})).unwrap();
        registry.fill(Some("call_a"), json!({"temp": 20})).unwrap();
        let parts = registry.into_parts();
        assert_eq!(response_names(&parts), vec!["get_weather", "get_time"]);
        assert_eq!(
            parts[0].function_response.as_ref().unwrap().response,
            json!({"temp": 20})
        );
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let mut registry = registry();
        match registry.fill(Some("call_c"), json!({})) {
            Err(ProxyError::Validation { message, .. }) => assert!(message.contains("call_c")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_fill_is_rejected() {
        let mut registry = registry();
        registry.fill(Some("call_a"), json!({})).unwrap();
        match registry.fill(Some("call_a"), json!({})) {
            Err(ProxyError::Validation { message, .. }) => assert!(message.starts_with("Duplicated")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_call_id_is_rejected() {
        let mut registry = registry();
        match registry.register("call_a", "get_time") {
            Err(ProxyError::Validation { status, message }) => {
                assert_eq!(status, http::StatusCode::BAD_REQUEST);
                assert!(message.contains("call_a"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        registry.fill(Some("call_a"), json!({"temp": 20})).unwrap();
        let parts = registry.into_parts();
        assert_eq!(response_names(&parts), vec!["get_weather"]);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let mut registry = registry();
        assert!(registry.fill(None, json!({})).is_err());
    }

    #[test]
    fn test_non_object_result_is_wrapped() {
        let mut registry = registry();
        registry.fill(Some("call_a"), json!(42)).unwrap();
        let parts = registry.into_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].function_response.as_ref().unwrap().response,
            json!({"result": 42})
        );
    }

    #[test]
    fn test_upstream_ids_are_kept() {
        let mut registry = FunctionCallRegistry::default();
        registry.register("fc_123", "lookup").unwrap();
        registry.fill(Some("fc_123"), json!({})).unwrap();
        let parts = registry.into_parts();
        assert_eq!(
            parts[0].function_response.as_ref().unwrap().id.as_deref(),
            Some("fc_123")
        );
        assert_eq!(upstream_call_id("call_xyz"), None);
    }
}
