//! Maps client-supplied model names onto upstream model names.

const SEARCH_SUFFIX: &str = ":search";
const SEARCH_PREVIEW_SUFFIX: &str = "-search-preview";
const UPSTREAM_FAMILIES: &[&str] = &["gemini-", "gemma-", "learnlm-"];

/// The upstream chat model, and whether the search tool rides along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatModel {
    pub name: String,
    pub google_search: bool,
}

#[must_use]
pub fn resolve_chat_model(requested: Option<&str>, default: &str) -> ChatModel {
    let mut name = match requested {
        Some(model) if model.starts_with("models/") => model["models/".len()..].to_string(),
        Some(model) if UPSTREAM_FAMILIES.iter().any(|p| model.starts_with(p)) => model.to_string(),
        _ => default.to_string(),
    };

    let mut google_search = requested.is_some_and(|m| m.ends_with(SEARCH_PREVIEW_SUFFIX));
    if let Some(stripped) = name.strip_suffix(SEARCH_SUFFIX) {
        name = stripped.to_string();
        google_search = true;
    }

    ChatModel {
        name,
        google_search,
    }
}

/// Upstream embeddings model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingsModel {
    /// `models/<name>`, as used in the URL and request body.
    pub resource: String,
    /// Echoed back in the response.
    pub reported: String,
}

#[must_use]
pub fn resolve_embeddings_model(requested: &str, default: &str) -> EmbeddingsModel {
    if requested.starts_with("models/") {
        return EmbeddingsModel {
            resource: requested.to_string(),
            reported: requested.to_string(),
        };
    }
    let name = if requested.starts_with("gemini-") {
        requested
    } else {
        default
    };
    EmbeddingsModel {
        resource: format!("models/{name}"),
        reported: name.to_string(),
    }
}
