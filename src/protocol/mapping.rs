use crate::error::ProxyError;

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

/// Inbound message role, after aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// # Errors
///
/// Returns a 400 [`ProxyError`] for a role outside the chat vocabulary.
pub fn openai_role(s: &str) -> Result<ChatRole, ProxyError> {
    match s {
        "system" | "developer" => Ok(ChatRole::System),
        "user" => Ok(ChatRole::User),
        "assistant" => Ok(ChatRole::Assistant),
        "tool" => Ok(ChatRole::Tool),
        other => Err(ProxyError::invalid_request(format!(
            "Unknown message role: \"{other}\""
        ))),
    }
}

#[must_use]
pub fn chat_role_to_gemini(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System | ChatRole::User => "user", // system is handled via systemInstruction
        ChatRole::Assistant => "model",
        ChatRole::Tool => "function",
    }
}

// ---------------------------------------------------------------------------
// Finish reasons
// ---------------------------------------------------------------------------

/// Map a Gemini `finishReason` to the `OpenAI` vocabulary.
///
/// Any tool call in the candidate wins over the upstream value. Unknown
/// reasons pass through verbatim.
#[must_use]
pub fn gemini_finish_reason_to_openai(reason: Option<&str>, has_tool_calls: bool) -> Option<String> {
    let reason = reason?;
    if has_tool_calls {
        return Some("tool_calls".to_string());
    }
    let mapped = match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => "content_filter",
        other => other,
    };
    Some(mapped.to_string())
}

// ---------------------------------------------------------------------------
// Tool choice
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns a 400 [`ProxyError`] for a mode Gemini has no counterpart for.
pub fn openai_tool_choice_mode_to_gemini(mode: &str) -> Result<&'static str, ProxyError> {
    match mode {
        "auto" => Ok("AUTO"),
        "none" => Ok("NONE"),
        "required" | "any" => Ok("ANY"),
        other => Err(ProxyError::invalid_request(format!(
            "Unsupported tool_choice: \"{other}\""
        ))),
    }
}
