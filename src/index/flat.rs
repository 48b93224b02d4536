//! Exhaustive nearest-neighbour index over squared Euclidean distance.
#![forbid(unsafe_code)]

use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::IndexError;

pub type Float = f32;

/// Name recorded in persisted artifacts for the distance used here.
pub const METRIC_NAME: &str = "squared_l2";

/// One search hit: the vector's insertion position and its distance to the
/// query (smaller is closer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: Float,
}

/// Row-major matrix of vectors, all of one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    matrix: Vec<Float>,
}

// Heap entry ordered by (distance, position); the max-heap keeps the k best
// by popping the worst, and equal distances rank by insertion position.
#[derive(PartialEq)]
struct ScoredIndex {
    distance: Float,
    position: usize,
}

impl Eq for ScoredIndex {}

impl PartialOrd for ScoredIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            matrix: Vec::new(),
        })
    }

    /// Rebuilds an index from a persisted matrix, re-checking its shape.
    pub fn from_parts(dimension: usize, matrix: Vec<Float>) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if matrix.len() % dimension != 0 {
            return Err(IndexError::RaggedMatrix {
                len: matrix.len(),
                dimension,
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::NonFinite);
        }
        Ok(Self { dimension, matrix })
    }

    pub fn add(&mut self, vector: &[Float]) -> Result<usize, IndexError> {
        self.check_vector(vector)?;
        self.matrix.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    /// The `k` closest vectors to `query`, nearest first. `k` is clamped to
    /// the number of stored vectors.
    pub fn search(&self, query: &[Float], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_vector(query)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let distances: Vec<Float> = self
            .matrix
            .par_chunks_exact(self.dimension)
            .map(|row| squared_l2(row, query))
            .collect();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (position, distance) in distances.into_iter().enumerate() {
            heap.push(ScoredIndex { distance, position });
            if heap.len() > k {
                heap.pop();
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| Neighbor {
                position: s.position,
                distance: s.distance,
            })
            .collect())
    }

    pub fn vector(&self, position: usize) -> Option<&[Float]> {
        let start = position.checked_mul(self.dimension)?;
        self.matrix.get(start..start + self.dimension)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.matrix.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn matrix(&self) -> &[Float] {
        &self.matrix
    }

    fn check_vector(&self, vector: &[Float]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::NonFinite);
        }
        Ok(())
    }
}

#[inline]
fn squared_l2(a: &[Float], b: &[Float]) -> Float {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_index(count: usize, dim: usize) -> (FlatL2Index, Vec<Vec<Float>>) {
        let mut rng = rand::thread_rng();
        let vectors: Vec<Vec<Float>> = (0..count)
            .map(|_| (0..dim).map(|_| rng.gen::<Float>()).collect())
            .collect();
        let mut index = FlatL2Index::new(dim).unwrap();
        for v in &vectors {
            index.add(v).unwrap();
        }
        (index, vectors)
    }

    #[test]
    fn nearest_neighbour_of_stored_vector_is_itself() {
        let (index, vectors) = random_index(100, 16);
        let hits = index.search(&vectors[42], 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].position, 42);
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn k_is_clamped_to_len() {
        let (index, vectors) = random_index(4, 3);
        assert_eq!(index.search(&vectors[0], 6).unwrap().len(), 4);
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let index = FlatL2Index::new(3).unwrap();
        assert!(index.search(&[0.0, 0.0, 0.0], 6).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[-1.0, 0.0]).unwrap();
        index.add(&[5.0, 5.0]).unwrap();

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn squared_distance_is_used() {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(&[3.0, 4.0]).unwrap();
        let hits = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].distance, 25.0);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let mut index = FlatL2Index::new(3).unwrap();
        assert_eq!(
            index.add(&[1.0, 2.0]),
            Err(IndexError::DimensionMismatch { expected: 3, got: 2 })
        );
        index.add(&[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            index.search(&[1.0; 4], 1),
            Err(IndexError::DimensionMismatch { expected: 3, got: 4 })
        ));
    }

    #[test]
    fn non_finite_vectors_are_rejected() {
        let mut index = FlatL2Index::new(2).unwrap();
        assert_eq!(index.add(&[Float::NAN, 0.0]), Err(IndexError::NonFinite));
        assert_eq!(index.add(&[Float::INFINITY, 0.0]), Err(IndexError::NonFinite));
    }

    #[test]
    fn from_parts_validates_shape() {
        assert_eq!(
            FlatL2Index::from_parts(2, vec![1.0, 2.0, 3.0]),
            Err(IndexError::RaggedMatrix { len: 3, dimension: 2 })
        );
        assert_eq!(FlatL2Index::from_parts(0, vec![]), Err(IndexError::ZeroDimension));

        let index = FlatL2Index::from_parts(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.vector(2), None);
    }
}
