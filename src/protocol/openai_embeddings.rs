use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /embeddings` body. `model` stays raw so a non-string is reported, not rejected by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiEmbeddingsRequest {
    #[serde(default)]
    pub model: Value,
    pub input: OpenAiEmbeddingsInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiEmbeddingsInput {
    Single(String),
    Multi(Vec<String>),
}

impl OpenAiEmbeddingsInput {
    #[must_use]
    pub fn into_texts(self) -> Vec<String> {
        match self {
            OpenAiEmbeddingsInput::Single(s) => vec![s],
            OpenAiEmbeddingsInput::Multi(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiEmbeddingsResponse {
    pub object: String,
    pub data: Vec<OpenAiEmbedding>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiEmbedding {
    pub object: String,
    pub index: usize,
    pub embedding: Vec<f64>,
}
