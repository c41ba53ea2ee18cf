//! Embedding client: query text to fixed-length vector, via an Ollama server.

mod cache;
mod ollama;

pub use cache::EmbeddingCache;
pub use ollama::OllamaEmbedder;
