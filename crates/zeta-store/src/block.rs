//! A single immutable archived KV block, plus its transient runtime state.

use memmap2::Mmap;

use crate::format::ZetaHeader;

/// Monotonic 64-bit block identifier.
pub type BlockId = i64;

/// An immutable packaged excerpt of the KV cache.
///
/// Persisted fields (`header`, `summary`, and the `keys`/`values` reached
/// through the mmap) never change after construction. Only the runtime
/// fields below are mutated, by the store and the retrieval engine, across
/// the block's lifetime.
pub struct Block {
    header: ZetaHeader,
    summary: Vec<f32>,
    summary_norm: f32,
    mmap: Option<Mmap>,

    /// Current temporal-decay weight, in `[0, 1]`.
    pub zeta_potential: f32,
    /// Decode step at which this block was last touched.
    pub last_access: u64,
    /// Whether the block's mapping is currently paged in (hinted or
    /// actually resident).
    pub is_warm: bool,
    /// Whether the block is in the store's active set.
    pub is_active: bool,
    /// Outgoing `(target_block_id, weight)` edges, at most `MAX_LINKS`.
    pub adjacency: Vec<(BlockId, f32)>,
    /// Immediately preceding block in archive order, if any.
    pub temporal_prev: Option<BlockId>,
    /// Generation counter of the decode step this block was last
    /// activated in; used to forbid evicting a block within the same step
    /// it was just activated.
    pub activated_generation: u64,
}

impl Block {
    pub(crate) fn new(header: ZetaHeader, summary: Vec<f32>, mmap: Option<Mmap>) -> Self {
        let summary_norm = l2_norm(&summary);
        let is_warm = mmap_is_some(&mmap);
        Self {
            header,
            summary,
            summary_norm,
            mmap,
            zeta_potential: 1.0,
            last_access: 0,
            is_warm,
            is_active: false,
            adjacency: Vec::new(),
            temporal_prev: None,
            activated_generation: 0,
        }
    }

    /// The block's identifier.
    pub fn id(&self) -> BlockId {
        self.header.block_id
    }

    /// The logical token range this block represents.
    pub fn token_range(&self) -> (i64, i64) {
        (self.header.token_start, self.header.token_count)
    }

    /// Vector dimension of keys, values, and summary.
    pub fn summary_dim(&self) -> usize {
        self.header.summary_dim as usize
    }

    /// Number of tokens this block represents.
    pub fn token_count(&self) -> usize {
        self.header.token_count as usize
    }

    /// The mean-pooled (or externally supplied) summary vector.
    pub fn summary(&self) -> &[f32] {
        &self.summary
    }

    /// Cached `||summary||_2`.
    pub fn summary_norm(&self) -> f32 {
        self.summary_norm
    }

    /// Row-major keys, decoded from the mmap, if resident.
    ///
    /// `token_count * summary_dim` floats, row-major.
    pub fn keys(&self) -> Option<Vec<f32>> {
        self.kv_region(0)
    }

    /// Row-major values, decoded from the mmap, if resident.
    pub fn values(&self) -> Option<Vec<f32>> {
        self.kv_region(1)
    }

    /// Raw key/value bytes as they sit in the mapping, without decoding.
    /// `mmap_kv` in `spec.md` §4.3's invariant is exactly this offset:
    /// `header_size + summary_bytes` into the mapping.
    pub fn kv_bytes(&self) -> Option<&[u8]> {
        let mmap = self.mmap.as_ref()?;
        let dim = self.summary_dim();
        let summary_bytes = dim * 4;
        let base = crate::format::HEADER_SIZE + summary_bytes;
        mmap.get(base..)
    }

    fn kv_region(&self, which: usize) -> Option<Vec<f32>> {
        let mmap = self.mmap.as_ref()?;
        let dim = self.summary_dim();
        let count = self.token_count();
        let summary_bytes = dim * 4;
        let kv_bytes = count * dim * 4;
        let base = crate::format::HEADER_SIZE + summary_bytes + which * kv_bytes;
        let end = base + kv_bytes;
        if end > mmap.len() {
            return None;
        }
        let bytes = mmap.get(base..end)?;
        Some(crate::format::read_f32_slice(bytes, 0, count * dim))
    }

    pub(crate) fn set_mmap(&mut self, mmap: Option<Mmap>) {
        self.is_warm = mmap_is_some(&mmap);
        self.mmap = mmap;
    }

    pub(crate) fn mmap(&self) -> Option<&Mmap> {
        self.mmap.as_ref()
    }
}

fn mmap_is_some(mmap: &Option<Mmap>) -> bool {
    mmap.is_some()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_norm_is_computed_on_construction() {
        let header = ZetaHeader {
            block_id: 0,
            token_start: 0,
            token_count: 1,
            summary_dim: 4,
        };
        let block = Block::new(header, vec![0.5, 0.5, 0.0, 0.0], None);
        let expected = (0.5f32 * 0.5 + 0.5 * 0.5).sqrt();
        assert!((block.summary_norm() - expected).abs() < 1e-6);
    }
}
