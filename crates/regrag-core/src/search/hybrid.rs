//! Hybrid fusion of dense and sparse rankings
//!
//! Each strategy's scores are min-max normalized over its own result set,
//! then combined as a weighted sum. Overlapping passages from the same
//! source collapse into one fused hit.

use super::IndexHit;
use std::cmp::Ordering;

/// Weights applied to the normalized dense and sparse scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub dense: f64,
    pub sparse: f64,
}

impl FusionWeights {
    /// Scale so the weights sum to one; degenerate input falls back to equal weighting
    pub fn new(dense: f64, sparse: f64) -> Self {
        let total = dense + sparse;
        if dense < 0.0 || sparse < 0.0 || total <= 0.0 {
            return Self::default();
        }
        Self {
            dense: dense / total,
            sparse: sparse / total,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            dense: 0.5,
            sparse: 0.5,
        }
    }
}

/// A passage after fusion
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// The passage; `score` holds the fused score
    pub hit: IndexHit,
    pub dense_score: Option<f64>,
    pub sparse_score: Option<f64>,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

impl FusedHit {
    fn fused(&self, weights: FusionWeights) -> f64 {
        weights.dense * self.dense_score.unwrap_or(0.0)
            + weights.sparse * self.sparse_score.unwrap_or(0.0)
    }
}

/// Min-max normalize into [0, 1]. A single score or an all-equal set maps to 1.0.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    scores
        .iter()
        .map(|&s| {
            if range <= f64::EPSILON {
                1.0
            } else {
                ((s - min) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Same source and one text contains the other (whitespace and case insensitive)
pub fn spans_overlap(a: &IndexHit, b: &IndexHit) -> bool {
    if a.source_id != b.source_id {
        return false;
    }
    let ta = normalize_whitespace(&a.text);
    let tb = normalize_whitespace(&b.text);
    ta.contains(&tb) || tb.contains(&ta)
}

#[derive(Clone, Copy)]
enum Side {
    Dense,
    Sparse,
}

fn absorb(candidates: &mut Vec<FusedHit>, hit: &IndexHit, norm: f64, rank: usize, side: Side) {
    if let Some(existing) = candidates.iter_mut().find(|c| spans_overlap(&c.hit, hit)) {
        let (score, existing_rank) = match side {
            Side::Dense => (&mut existing.dense_score, &mut existing.dense_rank),
            Side::Sparse => (&mut existing.sparse_score, &mut existing.sparse_rank),
        };
        // Duplicate within one strategy keeps the better score
        if score.map_or(true, |s| norm > s) {
            *score = Some(norm);
            *existing_rank = Some(existing_rank.map_or(rank, |r| r.min(rank)));
        }
        return;
    }

    let mut fused = FusedHit {
        hit: hit.clone(),
        dense_score: None,
        sparse_score: None,
        dense_rank: None,
        sparse_rank: None,
    };
    match side {
        Side::Dense => {
            fused.dense_score = Some(norm);
            fused.dense_rank = Some(rank);
        }
        Side::Sparse => {
            fused.sparse_score = Some(norm);
            fused.sparse_rank = Some(rank);
        }
    }
    candidates.push(fused);
}

fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Fuse two ranked hit lists into one, best first.
///
/// Ties on the fused score prefer hits found by the dense strategy, then the
/// better dense rank, then the better sparse rank.
pub fn fuse(dense: &[IndexHit], sparse: &[IndexHit], weights: FusionWeights) -> Vec<FusedHit> {
    let dense_norm = normalize_scores(&dense.iter().map(|h| h.score).collect::<Vec<_>>());
    let sparse_norm = normalize_scores(&sparse.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut candidates: Vec<FusedHit> = Vec::with_capacity(dense.len() + sparse.len());
    for (rank, (hit, norm)) in dense.iter().zip(dense_norm).enumerate() {
        absorb(&mut candidates, hit, norm, rank, Side::Dense);
    }
    for (rank, (hit, norm)) in sparse.iter().zip(sparse_norm).enumerate() {
        absorb(&mut candidates, hit, norm, rank, Side::Sparse);
    }

    for candidate in &mut candidates {
        candidate.hit.score = candidate.fused(weights);
    }

    candidates.sort_by(|a, b| {
        b.hit
            .score
            .partial_cmp(&a.hit.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank_order(a.dense_rank, b.dense_rank))
            .then_with(|| rank_order(a.sparse_rank, b.sparse_rank))
    });

    candidates
}
