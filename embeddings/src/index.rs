//! In-memory vector index with exact cosine search.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{find_top_k, normalize};

/// A vector and the payload it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry<T> {
    pub embedding: Embedding,
    pub payload: T,
}

impl<T> IndexEntry<T> {
    pub fn new(embedding: Embedding, payload: T) -> Self {
        Self { embedding, payload }
    }
}

/// A query hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredEntry<'a, T> {
    pub payload: &'a T,

    /// Cosine similarity to the query.
    pub score: f32,

    /// Insertion position of the entry.
    pub position: usize,
}

/// An exact, linear-scan similarity index.
///
/// All vectors share one dimension and are stored L2-normalized. Results
/// come back by descending score, and entries with equal scores are
/// returned in insertion order.
#[derive(Debug, Clone)]
pub struct VectorIndex<T> {
    vectors: Vec<Embedding>,
    payloads: Vec<T>,
    dimension: usize,
}

impl<T> VectorIndex<T> {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Vec::new(),
            payloads: Vec::new(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.payloads.clear();
    }

    /// Iterate over stored (normalized) vectors and payloads in insertion
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], &T)> {
        self.vectors
            .iter()
            .map(Vec::as_slice)
            .zip(self.payloads.iter())
    }

    /// Replace the contents of the index.
    ///
    /// Every entry is validated first. On error the previous contents are
    /// kept unchanged.
    pub fn build(&mut self, entries: impl IntoIterator<Item = IndexEntry<T>>) -> Result<()> {
        let mut vectors = Vec::new();
        let mut payloads = Vec::new();

        for IndexEntry {
            mut embedding,
            payload,
        } in entries
        {
            self.check(&embedding)?;
            normalize(&mut embedding);
            vectors.push(embedding);
            payloads.push(payload);
        }

        self.vectors = vectors;
        self.payloads = payloads;
        debug!(
            "Built vector index with {} entries (dimension {})",
            self.len(),
            self.dimension
        );
        Ok(())
    }

    /// Return up to `k` entries most similar to `query`.
    ///
    /// `k` larger than the index is clamped; an empty index yields no hits.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry<'_, T>>> {
        self.check(query)?;

        let mut query = query.to_vec();
        normalize(&mut query);

        let k = k.min(self.len());
        let hits = find_top_k(&query, &self.vectors, k, f32::NEG_INFINITY)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.payloads.get(hit.index).map(|payload| ScoredEntry {
                    payload,
                    score: hit.score,
                    position: hit.index,
                })
            })
            .collect())
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::InvalidInput(
                "vector contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index_of(vectors: &[(&str, Vec<f32>)]) -> VectorIndex<String> {
        let mut index = VectorIndex::new(3);
        index
            .build(
                vectors
                    .iter()
                    .map(|(name, v)| IndexEntry::new(v.clone(), name.to_string())),
            )
            .unwrap();
        index
    }

    fn names(hits: &[ScoredEntry<'_, String>]) -> Vec<String> {
        hits.iter().map(|h| h.payload.clone()).collect()
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let index = index_of(&[
            ("b", vec![0.0, 1.0, 0.0]),
            ("a", vec![1.0, 0.0, 0.0]),
            ("c", vec![0.7, 0.7, 0.0]),
        ]);

        let hits = index.query(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(names(&hits), vec!["a", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].position, 1);
    }

    #[test]
    fn test_vectors_are_normalized_on_insert() {
        let index = index_of(&[("long", vec![10.0, 0.0, 0.0])]);

        let (vector, _) = index.iter().next().unwrap();
        assert_eq!(vector, &[1.0, 0.0, 0.0]);

        let hits = index.query(&[3.0, 0.0, 0.0], 1).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = index_of(&[
            ("first", vec![1.0, 0.0, 0.0]),
            ("second", vec![2.0, 0.0, 0.0]),
            ("third", vec![0.5, 0.0, 0.0]),
        ]);

        let hits = index.query(&[1.0, 0.0, 0.0], 3).unwrap();

        assert_eq!(names(&hits), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_k_is_clamped() {
        let index = index_of(&[("a", vec![1.0, 0.0, 0.0]), ("b", vec![0.0, 1.0, 0.0])]);
        assert_eq!(index.query(&[1.0, 1.0, 0.0], 50).unwrap().len(), 2);

        let empty: VectorIndex<String> = VectorIndex::new(3);
        assert!(empty.query(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = index_of(&[("a", vec![1.0, 0.0, 0.0])]);
        assert!(matches!(
            index.query(&[1.0, 0.0], 1),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_failed_build_keeps_previous_contents() {
        let mut index = index_of(&[("old", vec![1.0, 0.0, 0.0])]);

        let result = index.build(vec![
            IndexEntry::new(vec![0.0, 1.0, 0.0], "new".to_string()),
            IndexEntry::new(vec![0.0, 1.0], "bad".to_string()),
        ]);

        assert!(result.is_err());
        assert_eq!(index.len(), 1);
        let hits = index.query(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(names(&hits), vec!["old"]);
    }

    #[test]
    fn test_build_replaces_contents() {
        let mut index = index_of(&[("old", vec![1.0, 0.0, 0.0])]);
        index
            .build(vec![IndexEntry::new(vec![0.0, 0.0, 1.0], "new".to_string())])
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(names(&hits), vec!["new"]);

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 3);
    }

    #[test]
    fn test_non_finite_vectors_are_rejected() {
        let mut index: VectorIndex<String> = VectorIndex::new(3);
        let result = index.build(vec![IndexEntry::new(
            vec![f32::NAN, 0.0, 0.0],
            "nan".to_string(),
        )]);
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }
}
