// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::cmp::Ordering;

use crate::core::types::RecordId;

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Cosine similarity; zero vectors score 0.0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, magnitude(a), b, magnitude(b))
}

pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

pub fn negative_squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    -a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
}

// -0.0 and 0.0 are the same score.
fn canonical(score: f32) -> f32 {
    if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// Result ordering: descending score, ties broken by ascending id.
pub fn rank_order(a: &(RecordId, f32), b: &(RecordId, f32)) -> Ordering {
    canonical(b.1)
        .total_cmp(&canonical(a.1))
        .then_with(|| a.0.cmp(&b.0))
}

/// Keeps the best `k` scored ids, in rank order.
pub fn top_k(mut scored: Vec<(RecordId, f32)>, k: usize) -> Vec<(RecordId, f32)> {
    if k == 0 {
        return Vec::new();
    }
    if scored.len() > k {
        scored.select_nth_unstable_by(k - 1, rank_order);
        scored.truncate(k);
    }
    scored.sort_by(rank_order);
    scored
}
