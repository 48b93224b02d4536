//! Error taxonomy for the indexing, persistence and retrieval pipeline.
//!
//! Each stage has its own enum so callers can decide locally whether a
//! failure is recoverable (a missing source file, a corrupt tier) or fatal
//! (an embedding provider that cannot produce vectors). [`RagError`] is the
//! umbrella used where several stages meet.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::TierAttempt;

/// Longest error message handed back to a client before truncation.
pub const MAX_CLIENT_MESSAGE_CHARS: usize = 180;

pub type RagResult<T> = Result<T, RagError>;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("source not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no documents were produced from any source")]
    NoDocuments,
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("embedding provider returned an empty vector")]
    EmptyVector,

    #[error("embedding contains NaN or infinite values")]
    NonFinite,
}

#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    #[error("vector dimension mismatch: index has {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{documents} documents but {vectors} vectors")]
    CountMismatch { documents: usize, vectors: usize },

    #[error("matrix of {len} floats is not a multiple of dimension {dimension}")]
    RaggedMatrix { len: usize, dimension: usize },

    #[error("vector contains NaN or infinite values")]
    NonFinite,

    #[error("index dimension must be greater than zero")]
    ZeroDimension,
}

/// Failures reading or writing a single persisted representation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Terminal outcomes of the tiered loader. Per-tier failures never surface
/// here; they are recorded in the attempt list and the next tier is tried.
#[derive(Error, Debug)]
pub enum IndexLoadError {
    #[error("no index could be loaded ({})", describe_attempts(.attempts))]
    Exhausted { attempts: Vec<TierAttempt> },

    #[error("rebuild from document list failed: {source}")]
    Rebuild {
        #[source]
        source: Box<RagError>,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("invalid prompt template: {0}")]
    Template(String),
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation provider error: {0}")]
    Provider(String),

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation timed out")]
    Timeout,

    #[error("query workers are shut down")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    IndexLoad(#[from] IndexLoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl RagError {
    /// Message suitable for a client-facing error field.
    pub fn client_message(&self) -> String {
        truncate_message(&self.to_string())
    }
}

/// Clip `message` to [`MAX_CLIENT_MESSAGE_CHARS`] characters, marking the cut.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_CLIENT_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut clipped: String = message.chars().take(MAX_CLIENT_MESSAGE_CHARS).collect();
    clipped.push_str("...");
    clipped
}

fn describe_attempts(attempts: &[TierAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
