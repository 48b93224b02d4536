//! Seams to the embedding and text-generation providers.
//!
//! The pipeline only ever talks to [`Embedder`] and [`Generator`]; the Ollama
//! adapters in [`ollama`] are the production implementations and tests plug
//! in fakes.

pub mod ollama;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{EmbeddingError, GenerationError};

pub use ollama::{OllamaConfig, OllamaEmbedder, OllamaGenerator};

/// Ordered, finite, single-pass sequence of generated text chunks.
pub type ChunkStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text. Every call for a given model returns vectors of the
    /// same length.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces the whole answer in one response.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Produces the answer as chunks in generation order.
    async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, GenerationError>;

    fn model_name(&self) -> &str;
}
