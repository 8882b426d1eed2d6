//! Memory-injection contribution and in-place superposition.

use crate::error::KernelError;

/// `O <- O + alpha * O_mem`, in place. `O` and `O_mem` must be the same
/// length.
pub fn superposition_injection(o: &mut [f32], o_mem: &[f32], alpha: f32) -> Result<(), KernelError> {
    if o.len() != o_mem.len() {
        return Err(KernelError::Dim {
            expected: o.len(),
            got: o_mem.len(),
        });
    }
    for (out, mem) in o.iter_mut().zip(o_mem.iter()) {
        *out += alpha * mem;
    }
    Ok(())
}

/// Computes one retrieved block's memory-injection contribution:
/// `alpha * softmax(q . K^T / sqrt(d)) . V`, with `K`/`V` row-major
/// `[token_count x d]` and the softmax taken across tokens, numerically
/// stable via max-subtraction.
pub fn memory_injection(
    query: &[f32],
    keys: &[f32],
    values: &[f32],
    dim: usize,
    alpha: f32,
) -> Result<Vec<f32>, KernelError> {
    if query.len() != dim {
        return Err(KernelError::Dim {
            expected: dim,
            got: query.len(),
        });
    }
    if keys.len() % dim != 0 || keys.len() != values.len() {
        return Err(KernelError::Dim {
            expected: keys.len(),
            got: values.len(),
        });
    }

    let token_count = keys.len() / dim;
    if token_count == 0 {
        return Ok(vec![0.0; dim]);
    }

    let scale = 1.0 / (dim as f32).sqrt();
    let mut scores = Vec::with_capacity(token_count);
    for t in 0..token_count {
        let key_row = row(keys, t, dim).ok_or(KernelError::OutOfBounds { index: t, len: token_count })?;
        let dot: f32 = query.iter().zip(key_row.iter()).map(|(a, b)| a * b).sum();
        scores.push(dot * scale);
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut weights = Vec::with_capacity(token_count);
    let mut sum = 0.0f32;
    for &s in &scores {
        let w = (s - max).exp();
        weights.push(w);
        sum += w;
    }
    if sum > 0.0 {
        for w in &mut weights {
            *w /= sum;
        }
    }

    let mut out = vec![0.0f32; dim];
    for (t, weight) in weights.iter().enumerate() {
        let value_row = row(values, t, dim).ok_or(KernelError::OutOfBounds { index: t, len: token_count })?;
        for (acc, v) in out.iter_mut().zip(value_row.iter()) {
            *acc += alpha * weight * v;
        }
    }

    Ok(out)
}

/// Element-wise cosine similarity between `query` and each row of
/// `summaries`, with no sharpening applied (the retrieval engine sharpens
/// separately).
pub fn cosine_similarity(query: &[f32], summaries: &[Vec<f32>]) -> Vec<f32> {
    let query_norm = l2_norm(query);
    summaries
        .iter()
        .map(|summary| {
            let summary_norm = l2_norm(summary);
            if query_norm == 0.0 || summary_norm == 0.0 {
                return 0.0;
            }
            let dot: f32 = query.iter().zip(summary.iter()).map(|(a, b)| a * b).sum();
            dot / (query_norm * summary_norm)
        })
        .collect()
}

fn row(flat: &[f32], index: usize, dim: usize) -> Option<&[f32]> {
    let start = index.checked_mul(dim)?;
    flat.get(start..start + dim)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
