//! Vector math for ranking chunks against a query.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

fn same_width(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() == b.len() {
        Ok(())
    } else {
        Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        })
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    same_width(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine of the angle between `a` and `b`, in `[-1.0, 1.0]`.
///
/// A zero vector has no direction, so it scores `0.0` against anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    let denominator = l2_norm(a) * l2_norm(b);
    if denominator == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / denominator)
}

/// Scale `embedding` to unit length in place. Zero vectors stay zero.
pub fn normalize(embedding: &mut Embedding) {
    let norm = l2_norm(embedding);
    if norm == 0.0 {
        return;
    }
    embedding.iter_mut().for_each(|x| *x /= norm);
}

/// Candidate position and its score against the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub index: usize,
    pub score: f32,
}

/// The `k` candidates most similar to `query`, best first.
///
/// Candidates scoring below `min_score` are skipped. The sort is stable, so
/// candidates with equal scores come out in their original order.
pub fn find_top_k(
    query: &[f32],
    candidates: &[Embedding],
    k: usize,
    min_score: f32,
) -> Result<Vec<SimilarityResult>> {
    let mut ranked = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(query, candidate)?;
        if score >= min_score {
            ranked.push(SimilarityResult { index, score });
        }
    }

    ranked.sort_by_key(|result| std::cmp::Reverse(OrderedFloat(result.score)));
    ranked.truncate(k);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let score = cosine_similarity(&[2.0, 0.0, 0.0], &[5.0, 0.0, 0.0]).unwrap();
        assert!(close(score, 1.0));
    }

    #[test]
    fn test_cosine_range_ends() {
        let right_angle = cosine_similarity(&[0.0, 3.0], &[4.0, 0.0]).unwrap();
        let reversed = cosine_similarity(&[1.0, -2.0], &[-1.0, 2.0]).unwrap();
        assert!(close(right_angle, 0.0));
        assert!(close(reversed, -1.0));
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_width_mismatch_is_reported() {
        let result = dot_product(&[1.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_normalize_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!(close(v[0], 0.6) && close(v[1], 0.8));

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_find_top_k_orders_and_truncates() {
        let candidates = vec![
            vec![0.0, 1.0, 0.0],
            vec![0.6, 0.8, 0.0],
            vec![1.0, 0.0, 0.0],
        ];

        let results = find_top_k(&[1.0, 0.0, 0.0], &candidates, 2, 0.0).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 1]);
        assert!(close(results[1].score, 0.6));
    }

    #[test]
    fn test_find_top_k_min_score_filters() {
        let candidates = vec![vec![-1.0, 0.0], vec![1.0, 0.0]];
        let results = find_top_k(&[1.0, 0.0], &candidates, 5, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
    }

    #[test]
    fn test_find_top_k_ties_keep_candidate_order() {
        let query = vec![1.0, 1.0];
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![1.0, 0.0]];

        let results = find_top_k(&query, &candidates, 3, -1.0).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 0, 2]);
    }
}
