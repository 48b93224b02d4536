use std::time::Instant;
use tracing::{info, warn};

use super::{FlatL2Index, IndexArtifact};
use crate::document::Document;
use crate::error::{EmbeddingError, IndexError, IngestionError, RagError, RagResult};
use crate::providers::Embedder;

/// Fixed text embedded once per build to learn the vector dimension.
pub const PROBE_TEXT: &str = "dimension probe";

const DEFAULT_PROGRESS_EVERY: usize = 500;

/// Embeds a document set and assembles the searchable [`IndexArtifact`].
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    progress_every: usize,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self {
            embedder,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Asks the provider for one vector and returns its length.
    pub async fn probe_dimension(&self) -> Result<usize, EmbeddingError> {
        let probe = self.embedder.embed(PROBE_TEXT).await?;
        if probe.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        Ok(probe.len())
    }

    /// Builds the artifact. Any embedding failure aborts the whole build; no
    /// partial index is returned.
    pub async fn build(&self, documents: Vec<Document>) -> RagResult<IndexArtifact> {
        if documents.is_empty() {
            return Err(IngestionError::NoDocuments.into());
        }

        let dimension = self.probe_dimension().await?;
        info!(
            model = self.embedder.model_name(),
            dimension,
            documents = documents.len(),
            "building index"
        );

        let started = Instant::now();
        let mut index = FlatL2Index::new(dimension)?;
        let mut zero_vectors = 0usize;

        for (i, doc) in documents.iter().enumerate() {
            let vector = self.embedder.embed(&doc.embed_text()).await?;
            if vector.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                }
                .into());
            }
            if vector.iter().all(|v| *v == 0.0) {
                zero_vectors += 1;
            }
            index.add(&vector).map_err(|e| match e {
                IndexError::NonFinite => RagError::from(EmbeddingError::NonFinite),
                other => RagError::from(other),
            })?;

            if (i + 1) % self.progress_every == 0 {
                info!(embedded = i + 1, total = documents.len(), "embedding progress");
            }
        }

        if zero_vectors > 0 {
            warn!(zero_vectors, "some documents embedded to all-zero vectors");
        }
        info!(
            documents = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );

        Ok(IndexArtifact::new(documents, index)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `[len, 1.0, ...]`-style vectors and can be told to misbehave
    /// on a particular call.
    struct ScriptedEmbedder {
        dim: usize,
        calls: AtomicUsize,
        bad_call: Option<(usize, Vec<f32>)>,
        fail_call: Option<usize>,
    }

    impl ScriptedEmbedder {
        fn new(dim: usize) -> Self {
            Self { dim, calls: AtomicUsize::new(0), bad_call: None, fail_call: None }
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_call == Some(call) {
                return Err(EmbeddingError::Provider("connection refused".into()));
            }
            if let Some((n, v)) = &self.bad_call {
                if *n == call {
                    return Ok(v.clone());
                }
            }
            let mut v = vec![1.0; self.dim];
            v[0] = text.len() as f32;
            Ok(v)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("d#{}", i), "x".repeat(i + 1), Metadata::new()))
            .collect()
    }

    #[tokio::test]
    async fn builds_one_vector_per_document() {
        let embedder = ScriptedEmbedder::new(4);
        let artifact = IndexBuilder::new(&embedder).build(docs(5)).await.unwrap();
        assert_eq!(artifact.len(), 5);
        assert_eq!(artifact.dimension(), 4);
        // probe + one call per document
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 6);
        assert_eq!(artifact.index().vector(2).unwrap()[0], 3.0);
    }

    #[tokio::test]
    async fn dimension_mismatch_aborts_build() {
        let mut embedder = ScriptedEmbedder::new(4);
        embedder.bad_call = Some((3, vec![1.0, 2.0]));
        let err = IndexBuilder::new(&embedder).build(docs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Embedding(EmbeddingError::DimensionMismatch { expected: 4, got: 2 })
        ));
    }

    #[tokio::test]
    async fn provider_failure_aborts_build() {
        let mut embedder = ScriptedEmbedder::new(4);
        embedder.fail_call = Some(2);
        let err = IndexBuilder::new(&embedder).build(docs(5)).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(EmbeddingError::Provider(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_finite_vectors_abort_build() {
        let mut embedder = ScriptedEmbedder::new(2);
        embedder.bad_call = Some((1, vec![f32::NAN, 0.0]));
        let err = IndexBuilder::new(&embedder).build(docs(2)).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(EmbeddingError::NonFinite)));
    }

    #[tokio::test]
    async fn empty_document_set_is_rejected_before_probing() {
        let embedder = ScriptedEmbedder::new(4);
        let err = IndexBuilder::new(&embedder).build(Vec::new()).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(IngestionError::NoDocuments)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
