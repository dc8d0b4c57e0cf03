//! `batchEmbedContents` and model listing.

use super::{
    GeminiBatchEmbedRequest, GeminiBatchEmbedResponse, GeminiContent, GeminiEmbedRequest,
    GeminiModelList, GeminiPart,
};
use crate::protocol::openai_embeddings::{OpenAiEmbedding, OpenAiEmbeddingsResponse};
use crate::protocol::openai_models::{OpenAiModel, OpenAiModelList};
use crate::routing::model::EmbeddingsModel;

/// One upstream request per input text, in input order.
#[must_use]
pub fn build_batch_embed_request(
    model: &EmbeddingsModel,
    texts: Vec<String>,
    dimensions: Option<u32>,
) -> GeminiBatchEmbedRequest {
    GeminiBatchEmbedRequest {
        requests: texts
            .into_iter()
            .map(|text| GeminiEmbedRequest {
                model: model.resource.clone(),
                content: GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::text(text)],
                },
                output_dimensionality: dimensions,
            })
            .collect(),
    }
}

#[must_use]
pub fn map_embeddings(
    response: GeminiBatchEmbedResponse,
    model: &EmbeddingsModel,
) -> OpenAiEmbeddingsResponse {
    OpenAiEmbeddingsResponse {
        object: "list".to_string(),
        data: response
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| OpenAiEmbedding {
                object: "embedding".to_string(),
                index,
                embedding: embedding.values,
            })
            .collect(),
        model: model.reported.clone(),
    }
}

#[must_use]
pub fn map_model_list(list: GeminiModelList) -> OpenAiModelList {
    OpenAiModelList {
        object: "list".to_string(),
        data: list
            .models
            .into_iter()
            .map(|model| {
                let id = model
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&model.name)
                    .to_string();
                OpenAiModel::new(id)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::model::resolve_embeddings_model;
    use serde_json::json;

    #[test]
    fn test_batch_request_shape() {
        let model = resolve_embeddings_model("text-embedding-3-small", "text-embedding-004");
        let request = build_batch_embed_request(
            &model,
            vec!["first".to_string(), "second".to_string()],
            Some(256),
        );
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"requests": [
                {"model": "models/text-embedding-004", "content": {"parts": [{"text": "first"}]}, "outputDimensionality": 256},
                {"model": "models/text-embedding-004", "content": {"parts": [{"text": "second"}]}, "outputDimensionality": 256}
            ]})
        );
    }

    #[test]
    fn test_embeddings_are_indexed_in_order() {
        let model = resolve_embeddings_model("gemini-embedding-001", "text-embedding-004");
        let response: GeminiBatchEmbedResponse = serde_json::from_value(json!({
            "embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3]}]
        }))
        .unwrap();
        let mapped = serde_json::to_value(map_embeddings(response, &model)).unwrap();
        assert_eq!(
            mapped,
            json!({
                "object": "list",
                "data": [
                    {"object": "embedding", "index": 0, "embedding": [0.1, 0.2]},
                    {"object": "embedding", "index": 1, "embedding": [0.3]}
                ],
                "model": "gemini-embedding-001"
            })
        );
    }

    #[test]
    fn test_model_list_strips_prefix() {
        let list: GeminiModelList = serde_json::from_value(json!({
            "models": [{"name": "models/gemini-2.5-flash", "displayName": "x"}, {"name": "tunedModels/abc"}]
        }))
        .unwrap();
        let mapped = map_model_list(list);
        assert_eq!(mapped.object, "list");
        assert_eq!(mapped.data[0], OpenAiModel::new("gemini-2.5-flash"));
        assert_eq!(mapped.data[1].id, "tunedModels/abc");
    }
}
