pub mod dispatch;
pub mod model;

pub use dispatch::dispatch_request;
pub use model::{resolve_chat_model, resolve_embeddings_model, ChatModel, EmbeddingsModel};
