pub mod builder;
pub mod flat;

pub use builder::{IndexBuilder, PROBE_TEXT};
pub use flat::{FlatL2Index, Neighbor, METRIC_NAME};

use crate::document::Document;
use crate::error::IndexError;

/// Documents paired one-to-one with the vectors of a [`FlatL2Index`]:
/// document `i` owns vector `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifact {
    documents: Vec<Document>,
    index: FlatL2Index,
}

impl IndexArtifact {
    pub fn new(documents: Vec<Document>, index: FlatL2Index) -> Result<Self, IndexError> {
        if documents.len() != index.len() {
            return Err(IndexError::CountMismatch {
                documents: documents.len(),
                vectors: index.len(),
            });
        }
        Ok(Self { documents, index })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    #[test]
    fn artifact_rejects_count_mismatch() {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        let docs = vec![
            Document::new("a#0", "one", Metadata::new()),
            Document::new("a#1", "two", Metadata::new()),
        ];
        assert_eq!(
            IndexArtifact::new(docs, index),
            Err(IndexError::CountMismatch { documents: 2, vectors: 1 })
        );
    }
}
