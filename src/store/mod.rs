//! Persistence of index artifacts and the tiered loader.
//!
//! Loading walks [`LOAD_ORDER`] top to bottom, trying each tier once:
//!
//! | tier | needs | on absence | on error |
//! |---|---|---|---|
//! | `FullIndex` | persisted directory | next tier | next tier |
//! | `SplitIndex` | vector-index file + document list | next tier | next tier |
//! | `Rebuild` | document list | [`IndexLoadError::Exhausted`] | [`IndexLoadError::Rebuild`] |
//!
//! Only `Rebuild` calls the embedding provider.

pub mod formats;

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{IndexLoadError, RagError, StoreError};
use crate::index::{IndexArtifact, IndexBuilder};
use crate::providers::Embedder;

pub const DEFAULT_PERSIST_DIR: &str = "./storage_nutrition";
pub const DEFAULT_VECTOR_INDEX_PATH: &str = "nutrition_vectors.index";
pub const DEFAULT_DOCUMENT_LIST_PATH: &str = "nutrition_docs.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTier {
    FullIndex,
    SplitIndex,
    Rebuild,
}

pub const LOAD_ORDER: [LoadTier; 3] =
    [LoadTier::FullIndex, LoadTier::SplitIndex, LoadTier::Rebuild];

impl LoadTier {
    /// Failure of a terminal tier ends loading instead of falling through.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadTier::Rebuild)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadTier::FullIndex => "full_index",
            LoadTier::SplitIndex => "split_index",
            LoadTier::Rebuild => "rebuild",
        }
    }
}

impl fmt::Display for LoadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Loaded,
    Absent,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: LoadTier,
    pub outcome: TierOutcome,
}

impl fmt::Display for TierAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            TierOutcome::Loaded => write!(f, "{}: loaded", self.tier),
            TierOutcome::Absent => write!(f, "{}: absent", self.tier),
            TierOutcome::Failed(reason) => write!(f, "{}: failed ({})", self.tier, reason),
        }
    }
}

/// Which persisted representations exist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceManifest {
    pub full_index_dir: bool,
    pub vector_index_file: bool,
    pub document_list_file: bool,
}

impl PersistenceManifest {
    pub fn has(&self, tier: LoadTier) -> bool {
        match tier {
            LoadTier::FullIndex => self.full_index_dir,
            LoadTier::SplitIndex => self.vector_index_file && self.document_list_file,
            LoadTier::Rebuild => self.document_list_file,
        }
    }
}

/// Representations `persist` can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    FullIndex,
    /// Vector-index file and document list together.
    SplitIndex,
    DocumentList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorePaths {
    pub persist_dir: PathBuf,
    pub vector_index_path: PathBuf,
    pub document_list_path: PathBuf,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            vector_index_path: PathBuf::from(DEFAULT_VECTOR_INDEX_PATH),
            document_list_path: PathBuf::from(DEFAULT_DOCUMENT_LIST_PATH),
        }
    }
}

impl StorePaths {
    /// All three artifacts under one directory, keeping the default names.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            persist_dir: root.join("storage_nutrition"),
            vector_index_path: root.join(DEFAULT_VECTOR_INDEX_PATH),
            document_list_path: root.join(DEFAULT_DOCUMENT_LIST_PATH),
        }
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub artifact: IndexArtifact,
    pub tier: LoadTier,
    pub attempts: Vec<TierAttempt>,
}

pub struct IndexStore {
    paths: StorePaths,
}

impl IndexStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn manifest(&self) -> PersistenceManifest {
        PersistenceManifest {
            full_index_dir: self.paths.persist_dir.is_dir(),
            vector_index_file: self.paths.vector_index_path.is_file(),
            document_list_file: self.paths.document_list_path.is_file(),
        }
    }

    /// Writes the requested representations of `artifact`.
    pub fn persist(
        &self,
        artifact: &IndexArtifact,
        representations: &[Representation],
    ) -> Result<(), StoreError> {
        let wants = |r: Representation| representations.contains(&r);

        if wants(Representation::SplitIndex) && !wants(Representation::FullIndex) {
            warn!("persisting without the full index; next startup will be slower");
        }

        if wants(Representation::FullIndex) {
            formats::write_full_index(&self.paths.persist_dir, artifact)?;
            info!(path = %self.paths.persist_dir.display(), "wrote full index");
        }
        if wants(Representation::SplitIndex) {
            formats::write_vector_index(&self.paths.vector_index_path, artifact.index())?;
            info!(path = %self.paths.vector_index_path.display(), "wrote vector index");
        }
        if wants(Representation::SplitIndex) || wants(Representation::DocumentList) {
            formats::write_document_list(&self.paths.document_list_path, artifact.documents())?;
            info!(
                path = %self.paths.document_list_path.display(),
                documents = artifact.len(),
                "wrote document list"
            );
        }
        Ok(())
    }

    /// Loads the best available tier. `embedder` is only used by a rebuild.
    pub async fn load(&self, embedder: &dyn Embedder) -> Result<LoadOutcome, IndexLoadError> {
        let manifest = self.manifest();
        let mut attempts = Vec::with_capacity(LOAD_ORDER.len());

        for tier in LOAD_ORDER {
            if !manifest.has(tier) {
                info!(%tier, "tier not present");
                attempts.push(TierAttempt { tier, outcome: TierOutcome::Absent });
                continue;
            }

            let started = Instant::now();
            match self.load_tier(tier, embedder).await {
                Ok(artifact) => {
                    info!(
                        %tier,
                        documents = artifact.len(),
                        dimension = artifact.dimension(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "index loaded"
                    );
                    attempts.push(TierAttempt { tier, outcome: TierOutcome::Loaded });
                    return Ok(LoadOutcome { artifact, tier, attempts });
                }
                Err(e) if tier.is_terminal() => {
                    return Err(IndexLoadError::Rebuild { source: Box::new(e) });
                }
                Err(e) => {
                    warn!(%tier, error = %e, "tier failed to load, falling back");
                    attempts.push(TierAttempt {
                        tier,
                        outcome: TierOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        Err(IndexLoadError::Exhausted { attempts })
    }

    async fn load_tier(
        &self,
        tier: LoadTier,
        embedder: &dyn Embedder,
    ) -> Result<IndexArtifact, RagError> {
        match tier {
            LoadTier::FullIndex => Ok(formats::read_full_index(&self.paths.persist_dir)?),
            LoadTier::SplitIndex => {
                let index = formats::read_vector_index(&self.paths.vector_index_path)?;
                let documents = formats::read_document_list(&self.paths.document_list_path)?;
                Ok(IndexArtifact::new(documents, index)?)
            }
            LoadTier::Rebuild => {
                let documents = formats::read_document_list(&self.paths.document_list_path)?;
                warn!(
                    documents = documents.len(),
                    "rebuilding embeddings from document list; this can take minutes"
                );
                IndexBuilder::new(embedder).build(documents).await
            }
        }
    }
}
