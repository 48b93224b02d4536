pub mod pool;
pub mod prompt;

pub use pool::QueryPool;
pub use prompt::{PromptTemplate, DEFAULT_TEMPLATE};

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{EmbeddingError, GenerationError, RagError, RagResult, ValidationError};
use crate::index::IndexArtifact;
use crate::providers::{ChunkStream, Embedder, Generator};

pub const DEFAULT_TOP_K: usize = 6;

const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document: Document,
    pub distance: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Food names of the documents the answer was grounded on, in rank order.
    pub sources: Vec<String>,
}

/// Events delivered to a streaming caller. A stream ends with exactly one
/// `Done` or one `Error`; nothing follows either.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Error(String),
}

/// Rejects empty or whitespace-only queries and returns the trimmed text.
pub fn validate_query(query: &str) -> Result<&str, ValidationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    Ok(trimmed)
}

/// Query-time service: embeds the question, retrieves the nearest documents,
/// builds the grounded prompt and hands it to the generator.
///
/// Built once at startup and shared read-only between requests.
pub struct RetrievalEngine {
    artifact: Arc<IndexArtifact>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    top_k: usize,
}

impl RetrievalEngine {
    pub fn new(
        artifact: IndexArtifact,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            artifact: Arc::new(artifact),
            embedder,
            generator,
            template: PromptTemplate::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn document_count(&self) -> usize {
        self.artifact.len()
    }

    pub fn dimension(&self) -> usize {
        self.artifact.dimension()
    }

    /// The `top_k` nearest documents to `query`, nearest first.
    pub async fn retrieve(&self, query: &str) -> RagResult<Vec<RetrievedDocument>> {
        let query = validate_query(query)?;
        let vector = self.embedder.embed(query).await?;
        if vector.len() != self.artifact.dimension() {
            warn!(
                expected = self.artifact.dimension(),
                got = vector.len(),
                "query embedding does not match the index; rebuild it with the current model"
            );
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.artifact.dimension(),
                got: vector.len(),
            }
            .into());
        }

        let hits = self.artifact.index().search(&vector, self.top_k)?;
        let documents = self.artifact.documents();
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| RetrievedDocument {
                document: documents[hit.position].clone(),
                distance: hit.distance,
                rank,
            })
            .collect())
    }

    /// Joins the retrieved documents' generation text in rank order.
    pub fn build_context(retrieved: &[RetrievedDocument]) -> String {
        retrieved
            .iter()
            .map(|r| r.document.llm_text())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    /// Retrieves context for `query` and renders the full prompt.
    pub async fn prepare_prompt(&self, query: &str) -> RagResult<(String, Vec<RetrievedDocument>)> {
        let query = validate_query(query)?;
        let retrieved = self.retrieve(query).await?;
        debug!(
            hits = retrieved.len(),
            nearest = retrieved.first().map(|r| r.document.food_name()),
            "retrieved context"
        );
        let prompt = self.template.render(&Self::build_context(&retrieved), query);
        Ok((prompt, retrieved))
    }

    /// Blocking delivery: the whole answer at once, trimmed.
    pub async fn answer(&self, query: &str) -> RagResult<Answer> {
        let (prompt, retrieved) = self.prepare_prompt(query).await?;
        let text = self.generator.generate(&prompt).await?;
        info!(sources = retrieved.len(), chars = text.len(), "answer generated");
        Ok(Answer {
            text: text.trim().to_string(),
            sources: retrieved
                .iter()
                .map(|r| r.document.food_name().to_string())
                .collect(),
        })
    }

    /// Streaming delivery: chunks in generation order. The caller joins them.
    pub async fn answer_stream(&self, query: &str) -> RagResult<ChunkStream> {
        let (prompt, _) = self.prepare_prompt(query).await?;
        Ok(self.generator.generate_stream(&prompt).await?)
    }

    /// Forwards a streamed answer into `sender`.
    ///
    /// Stops pulling from the provider as soon as the receiving side is gone.
    /// Any failure becomes a single terminal `StreamEvent::Error`.
    pub async fn stream_into(&self, query: &str, sender: mpsc::Sender<StreamEvent>) {
        let mut chunks = match self.answer_stream(query).await {
            Ok(chunks) => chunks,
            Err(e) => {
                let _ = sender.send(StreamEvent::Error(e.client_message())).await;
                return;
            }
        };

        while let Some(item) = chunks.next().await {
            if sender.is_closed() {
                debug!("stream receiver closed, abandoning generation");
                return;
            }
            match item {
                Ok(text) => {
                    if sender.send(StreamEvent::Chunk(text)).await.is_err() {
                        debug!("stream receiver closed, abandoning generation");
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "generation failed mid-stream");
                    let _ = sender.send(e.into()).await;
                    return;
                }
            }
        }
        let _ = sender.send(StreamEvent::Done).await;
    }
}

impl From<GenerationError> for StreamEvent {
    fn from(e: GenerationError) -> Self {
        StreamEvent::Error(RagError::from(e).client_message())
    }
}
