pub mod chat;
pub(crate) mod common;
pub mod embeddings;
pub mod health;
pub mod models;
pub mod speech;
