//! On-disk encodings of the persisted tiers.
//!
//! Full index (a directory):
//! - `index_meta.json`: format version, dimension, count, metric
//! - `docstore.json`: the documents, in vector order
//! - `vector_store.json`: the matrix as base64 little-endian f32
//!
//! Split index: a bincode vector-index file plus a bincode document list of
//! `(text, metadata)` pairs. The document list alone feeds a rebuild.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::{Document, Metadata, SOURCE_FILE_KEY};
use crate::error::StoreError;
use crate::index::{FlatL2Index, IndexArtifact, METRIC_NAME};

pub const FORMAT_VERSION: u32 = 1;

pub const META_FILE: &str = "index_meta.json";
pub const DOCSTORE_FILE: &str = "docstore.json";
pub const VECTOR_STORE_FILE: &str = "vector_store.json";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IndexMeta {
    pub format_version: u32,
    pub dimension: usize,
    pub count: usize,
    pub metric: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorStoreFile {
    dimension: usize,
    #[serde(with = "base64_floats")]
    matrix: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorIndexFile {
    format_version: u32,
    metric: String,
    dimension: usize,
    matrix: Vec<f32>,
}

/// Document-list entry: text and metadata, nothing that needs recomputing.
pub type DocumentRecord = (String, Metadata);

mod base64_floats {
    use super::*;
    use bytemuck::cast_slice;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vec: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        let bytes: &[u8] = cast_slice(vec);
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(serde::de::Error::custom(format!(
                "matrix byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

fn check_version(found: u32) -> Result<(), StoreError> {
    if found != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        });
    }
    Ok(())
}

fn check_metric(metric: &str) -> Result<(), StoreError> {
    if metric != METRIC_NAME {
        return Err(StoreError::Invalid(format!(
            "index uses metric '{}', expected '{}'",
            metric, METRIC_NAME
        )));
    }
    Ok(())
}

/// Writes `bytes` next to `path` and renames into place, so a reader never
/// sees a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(path, "tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}", suffix));
    path.with_file_name(name)
}

pub fn write_full_index(dir: &Path, artifact: &IndexArtifact) -> Result<(), StoreError> {
    let staging = sibling(dir, "staging");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let meta = IndexMeta {
        format_version: FORMAT_VERSION,
        dimension: artifact.dimension(),
        count: artifact.len(),
        metric: METRIC_NAME.to_string(),
    };
    let vectors = VectorStoreFile {
        dimension: artifact.dimension(),
        matrix: artifact.index().matrix().to_vec(),
    };
    fs::write(staging.join(META_FILE), serde_json::to_vec_pretty(&meta)?)?;
    fs::write(staging.join(DOCSTORE_FILE), serde_json::to_vec(artifact.documents())?)?;
    fs::write(staging.join(VECTOR_STORE_FILE), serde_json::to_vec(&vectors)?)?;

    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::rename(&staging, dir)?;
    Ok(())
}

pub fn read_full_index(dir: &Path) -> Result<IndexArtifact, StoreError> {
    let meta: IndexMeta = serde_json::from_slice(&fs::read(dir.join(META_FILE))?)?;
    check_version(meta.format_version)?;
    check_metric(&meta.metric)?;

    let documents: Vec<Document> = serde_json::from_slice(&fs::read(dir.join(DOCSTORE_FILE))?)?;
    let vectors: VectorStoreFile = serde_json::from_slice(&fs::read(dir.join(VECTOR_STORE_FILE))?)?;

    if vectors.dimension != meta.dimension {
        return Err(StoreError::Invalid(format!(
            "vector store dimension {} disagrees with metadata {}",
            vectors.dimension, meta.dimension
        )));
    }
    if documents.len() != meta.count {
        return Err(StoreError::Invalid(format!(
            "docstore holds {} documents, metadata says {}",
            documents.len(),
            meta.count
        )));
    }

    let index = FlatL2Index::from_parts(vectors.dimension, vectors.matrix)?;
    Ok(IndexArtifact::new(documents, index)?)
}

pub fn write_vector_index(path: &Path, index: &FlatL2Index) -> Result<(), StoreError> {
    let file = VectorIndexFile {
        format_version: FORMAT_VERSION,
        metric: METRIC_NAME.to_string(),
        dimension: index.dimension(),
        matrix: index.matrix().to_vec(),
    };
    write_atomic(path, &bincode::serialize(&file)?)
}

pub fn read_vector_index(path: &Path) -> Result<FlatL2Index, StoreError> {
    let file: VectorIndexFile = bincode::deserialize(&fs::read(path)?)?;
    check_version(file.format_version)?;
    check_metric(&file.metric)?;
    Ok(FlatL2Index::from_parts(file.dimension, file.matrix)?)
}

pub fn write_document_list(path: &Path, documents: &[Document]) -> Result<(), StoreError> {
    let records: Vec<DocumentRecord> = documents
        .iter()
        .map(|d| (d.text().to_string(), d.metadata().clone()))
        .collect();
    write_atomic(path, &bincode::serialize(&records)?)
}

/// Reads a document list back into documents. Ids are rebuilt from the
/// source label and list position.
pub fn read_document_list(path: &Path) -> Result<Vec<Document>, StoreError> {
    let records: Vec<DocumentRecord> = bincode::deserialize(&fs::read(path)?)?;
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(n, (text, metadata))| {
            let label = match metadata.get(SOURCE_FILE_KEY) {
                Some(source) => crate::document::source_label(&source.to_string()),
                None => "documents".to_string(),
            };
            Document::new(format!("{}#{}", label, n), text, metadata)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn base64_matrix_roundtrips_through_json() {
        let file = VectorStoreFile {
            dimension: 2,
            matrix: vec![1.0, -2.5, 0.125, 3.0],
        };
        let json = serde_json::to_string(&file).unwrap();
        let back: VectorStoreFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.matrix, file.matrix);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let json = r#"{"dimension": 2, "matrix": "INVALID_BASE64!!"}"#;
        assert!(serde_json::from_str::<VectorStoreFile>(json).is_err());
    }

    #[test]
    fn future_format_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        let file = VectorIndexFile {
            format_version: FORMAT_VERSION + 1,
            metric: METRIC_NAME.to_string(),
            dimension: 2,
            matrix: vec![0.0, 0.0],
        };
        fs::write(&path, bincode::serialize(&file).unwrap()).unwrap();
        assert!(matches!(
            read_vector_index(&path),
            Err(StoreError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn ragged_vector_index_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        let file = VectorIndexFile {
            format_version: FORMAT_VERSION,
            metric: METRIC_NAME.to_string(),
            dimension: 2,
            matrix: vec![0.0, 0.0, 1.0],
        };
        fs::write(&path, bincode::serialize(&file).unwrap()).unwrap();
        assert!(matches!(read_vector_index(&path), Err(StoreError::Index(_))));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("docs.bin");
        write_atomic(&path, b"payload").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert!(!sibling(&path, "tmp").exists());
    }
}
