pub(crate) mod error_shapes;
pub mod gemini;
pub mod mapping;
pub mod openai_chat;
pub mod openai_embeddings;
pub mod openai_models;
pub mod openai_speech;
