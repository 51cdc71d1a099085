//! Ranked semantic search over materialized window embeddings.
//!
//! Three interchangeable strategies score a document's window-0 matrix
//! against a combined query vector:
//!
//! - [`RankingStrategy::Exact`] — cosine against every row, full sort;
//! - [`RankingStrategy::Approximate`] — candidates from the persisted ANN
//!   index only, no exhaustive rescoring;
//! - [`RankingStrategy::LinearSeparator`] — a class-balanced linear
//!   soft-margin classifier fitted per query, rows scored by their signed
//!   decision value. Only valid for symmetric models.
//!
//! The strategy is chosen once at startup; per-document rankings are merged
//! into one globally sorted list with stable ties.

use serde::{Deserialize, Serialize};

use crate::ann::{self, VectorIndex};
use crate::api::QueryResult;
use crate::error::{Result, SemweaveError};
use crate::store::EmbeddingMatrix;
use crate::vecmath;

/// Query strategy, fixed for the lifetime of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RankingStrategy {
    Exact,
    Approximate,
    LinearSeparator {
        /// Soft-margin regularization parameter; higher values penalize
        /// mispredictions more.
        c: f32,
    },
}

impl RankingStrategy {
    /// Rejects strategy/model combinations that cannot work, before any I/O.
    pub fn validate(&self, asymmetric_model: bool) -> Result<()> {
        if matches!(self, RankingStrategy::LinearSeparator { .. }) && asymmetric_model {
            return Err(SemweaveError::config(
                "the linear-separator strategy requires a symmetric model whose query \
                 and document vectors share one space",
            ));
        }
        Ok(())
    }
}

/// One scored window of one document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankedWindow {
    pub score: f32,
    /// Store ordinal of the scored record.
    pub ordinal: usize,
}

fn top_k_descending(mut scored: Vec<RankedWindow>, k: usize) -> Vec<RankedWindow> {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Cosine similarity of the query against every row, best `k` kept.
pub fn rank_exact(matrix: &EmbeddingMatrix, query: &[f32], k: usize) -> Vec<RankedWindow> {
    let scored = (0..matrix.rows())
        .map(|ordinal| RankedWindow {
            score: vecmath::cosine(matrix.row(ordinal), query),
            ordinal,
        })
        .collect();
    top_k_descending(scored, k)
}

/// Candidates from the ANN index only; native distances converted to cosine.
pub fn rank_approximate(index: &VectorIndex, query: &[f32], k: usize) -> Vec<RankedWindow> {
    index
        .query(query, k)
        .into_iter()
        .map(|(ordinal, distance)| RankedWindow {
            score: ann::cosine_from_distance(distance),
            ordinal,
        })
        .collect()
}

const SEPARATOR_MAX_EPOCHS: usize = 1_000;
const SEPARATOR_TOLERANCE: f32 = 1e-6;

/// Fits a class-balanced linear soft-margin classifier on the document rows
/// (negative class) plus the query vector (positive class), then scores each
/// row by its signed decision value.
///
/// The fit is a deterministic full-batch subgradient descent on the hinge
/// loss with L2 regularization; class weights follow the balanced scheme
/// `n / (2 * n_class)`.
pub fn rank_separator(
    matrix: &EmbeddingMatrix,
    query: &[f32],
    k: usize,
    c: f32,
) -> Vec<RankedWindow> {
    let rows = matrix.rows();
    if rows == 0 {
        return Vec::new();
    }
    let dims = matrix.dims();
    let n = rows + 1;
    let negative_weight = n as f32 / (2.0 * rows as f32);
    let positive_weight = n as f32 / 2.0;
    let lambda = 1.0 / (c * n as f32);

    let mut w = vec![0.0f32; dims];
    let mut b = 0.0f32;
    let mut grad_w = vec![0.0f32; dims];

    for epoch in 1..=SEPARATOR_MAX_EPOCHS {
        for (g, wi) in grad_w.iter_mut().zip(&w) {
            *g = lambda * wi;
        }
        let mut grad_b = 0.0f32;

        let mut accumulate = |x: &[f32], label: f32, weight: f32| {
            let margin = label * (vecmath::dot(&w, x) + b);
            if margin < 1.0 {
                let scale = weight * label / n as f32;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g -= scale * xi;
                }
                grad_b -= scale;
            }
        };
        for ordinal in 0..rows {
            accumulate(matrix.row(ordinal), -1.0, negative_weight);
        }
        accumulate(query, 1.0, positive_weight);

        let step = 1.0 / (lambda * epoch as f32);
        let mut shift = 0.0f32;
        for (wi, g) in w.iter_mut().zip(&grad_w) {
            let delta = step * g;
            *wi -= delta;
            shift += delta * delta;
        }
        b -= step * grad_b;

        if shift.sqrt() < SEPARATOR_TOLERANCE {
            break;
        }
    }

    let scored = (0..rows)
        .map(|ordinal| RankedWindow {
            score: vecmath::dot(&w, matrix.row(ordinal)) + b,
            ordinal,
        })
        .collect();
    top_k_descending(scored, k)
}

/// Merges per-document result lists into one globally sorted list.
///
/// Sorting is by descending score with stable ties, so documents keep their
/// internal order and equal scores preserve arrival order. Pure function, no
/// side effects.
pub fn merge_results(per_document: Vec<Vec<QueryResult>>) -> Vec<QueryResult> {
    let mut merged: Vec<QueryResult> = per_document.into_iter().flatten().collect();
    merged.sort_by(|a, b| {
        b.distance
            .partial_cmp(&a.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_of(rows: &[&[f32]]) -> EmbeddingMatrix {
        let dims = rows[0].len();
        let mut matrix = EmbeddingMatrix::zeroed(rows.len(), dims);
        for (i, row) in rows.iter().enumerate() {
            matrix.set_row(i, row);
        }
        matrix
    }

    fn hit(filename: &str, distance: f32, index: usize) -> QueryResult {
        QueryResult {
            text: String::new(),
            distance,
            offset: (0, 0),
            index,
            filename: filename.to_string(),
            queries: Vec::new(),
            preferences: Vec::new(),
        }
    }

    #[test]
    fn exact_ranks_by_cosine() {
        let matrix = matrix_of(&[
            &[1.0, 0.0],
            &[0.0, 1.0],
            &[0.9, 0.1],
        ]);
        let ranked = rank_exact(&matrix, &[1.0, 0.0], 2);
        assert_eq!(ranked[0].ordinal, 0);
        assert_eq!(ranked[1].ordinal, 2);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn exact_respects_k() {
        let matrix = matrix_of(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert_eq!(rank_exact(&matrix, &[1.0, 0.0], 1).len(), 1);
    }

    #[test]
    fn separator_prefers_rows_near_the_query() {
        let matrix = matrix_of(&[
            &[0.95, 0.05],
            &[-0.8, 0.6],
            &[0.1, -0.99],
        ]);
        let ranked = rank_separator(&matrix, &[1.0, 0.0], 3, 1.0);
        assert_eq!(ranked[0].ordinal, 0);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn separator_is_deterministic() {
        let matrix = matrix_of(&[&[0.3, 0.7], &[-0.5, 0.2], &[0.9, -0.1]]);
        let a = rank_separator(&matrix, &[0.8, 0.2], 3, 1.0);
        let b = rank_separator(&matrix, &[0.8, 0.2], 3, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn separator_rejects_asymmetric_models() {
        let strategy = RankingStrategy::LinearSeparator { c: 1.0 };
        assert!(strategy.validate(true).is_err());
        assert!(strategy.validate(false).is_ok());
        assert!(RankingStrategy::Approximate.validate(true).is_ok());
    }

    #[test]
    fn merge_sorts_globally_with_stable_ties() {
        let doc_a = vec![hit("a", 0.9, 0), hit("a", 0.1, 1)];
        let doc_b = vec![hit("b", 0.95, 0), hit("b", 0.2, 1)];
        let merged = merge_results(vec![doc_a, doc_b]);
        let order: Vec<(&str, f32)> = merged
            .iter()
            .map(|r| (r.filename.as_str(), r.distance))
            .collect();
        assert_eq!(
            order,
            vec![("b", 0.95), ("a", 0.9), ("b", 0.2), ("a", 0.1)]
        );

        let tied = merge_results(vec![vec![hit("a", 0.5, 0)], vec![hit("b", 0.5, 0)]]);
        assert_eq!(tied[0].filename, "a");
        assert_eq!(tied[1].filename, "b");
    }

    #[test]
    fn merge_with_one_result_per_document() {
        let merged = merge_results(vec![vec![hit("a", 0.9, 0)], vec![hit("b", 0.95, 0)]]);
        assert_eq!(merged[0].filename, "b");
        assert_eq!(merged[1].filename, "a");
    }
}
