// Embeddings module
// Text chunking and the embedding models that turn chunks into vectors

pub mod chunking;
pub mod ollama;
pub mod tokenizer;

pub use chunking::{
    Chunk, Chunker, ChunkingConfig, HeuristicTokenCounter, TokenCounter, estimate_token_count,
};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, OllamaClient};
pub use tokenizer::{DEFAULT_TOKENIZER, TokenizerCounter};

/// Maps text to a fixed-length vector
///
/// Implementations must be deterministic for a fixed model, and the same
/// instance is expected to serve both ingestion and queries so stored and
/// query vectors live in the same space.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model
    fn model_id(&self) -> &str;

    /// Length of every vector returned by [`Embedder::embed`]
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
