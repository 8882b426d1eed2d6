//! Cubic-sharpened, temporally-decayed cosine scoring.

use zeta_store::Block;

/// Raw cosine similarity between a query and a block's summary vector.
///
/// Returns `0.0` for a zero-norm operand rather than propagating `NaN`,
/// mirroring how a degenerate (all-zero) block should simply never win a
/// ranking rather than poison it.
pub fn cosine_similarity(query: &[f32], query_norm: f32, summary: &[f32], summary_norm: f32) -> f32 {
    if query_norm == 0.0 || summary_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(summary.iter()).map(|(a, b)| a * b).sum();
    dot / (query_norm * summary_norm)
}

/// `max(0, cosine)^3`: the `ReLU` removes anti-correlated blocks entirely,
/// and cubing the remainder pushes high-similarity blocks further above the
/// pack than raw cosine does while leaving weak matches comparatively
/// suppressed. Always in `[0, 1]`.
pub fn sharpen(cosine: f32) -> f32 {
    let clamped = cosine.max(0.0);
    clamped * clamped * clamped
}

/// `exp(-lambda * age)`, `age` in decode steps since the block was last
/// touched. Always in `(0, 1]`.
pub fn temporal_weight(last_access: u64, current_step: u64, lambda: f32) -> f32 {
    let age = current_step.saturating_sub(last_access) as f32;
    (-lambda * age).exp()
}

/// Combined retrieval score for one block against one query.
///
/// `score = sharpen(cosine(query, summary)) * zeta_potential`, where
/// `zeta_potential` is the block's decayed relevance weight at the time of
/// scoring (`temporal_weight` folded into [`Block::zeta_potential`] by the
/// caller once per step, not recomputed per query).
pub fn score_block(query: &[f32], query_norm: f32, block: &Block) -> f32 {
    let cosine = cosine_similarity(query, query_norm, block.summary(), block.summary_norm());
    sharpen(cosine) * block.zeta_potential
}

/// `sqrt(sum(x_i^2))`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
