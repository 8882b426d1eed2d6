//! CPU attention-modifier kernels.
//!
//! Acts on a [`ScoreTile`] before softmax: temporal decay, sparse ("tunneling")
//! gating, the fused [`attention_modifier`] that guarantees no row goes fully
//! `-inf`, a sparsified numerically-stable softmax, and superposition
//! injection of retrieved-block memory contributions into the host's
//! attention output. A real accelerator backend is outside this repository's
//! scope; [`AccelKernels`] documents the seam a GPU implementation would fill
//! and the default CPU implementation is the one exercised here.

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

mod decay;
mod error;
mod gate;
mod softmax;
mod superposition;
mod tile;

pub use decay::{attention_modifier, temporal_decay};
pub use error::KernelError;
pub use gate::sparse_gate;
pub use softmax::sparse_softmax;
pub use superposition::{cosine_similarity, memory_injection, superposition_injection};
pub use tile::ScoreTile;

/// The kernel operations the orchestrator drives each decode step.
///
/// Behavior MUST match between any implementation (CPU or accelerator) of
/// this trait: same inputs produce bit-identical (or, for floating point,
/// tolerance-identical) outputs. Only one CPU implementation, [`CpuKernels`],
/// ships in this repository; a GPU backend is a host-side concern per this
/// subsystem's scope.
pub trait AccelKernels {
    /// Applies [`temporal_decay`] then [`sparse_gate`], with the all-masked-row
    /// safeguard, in place.
    fn attention_modifier(&self, tile: &mut ScoreTile, current_pos: i64, lambda: f32, tau: f32);

    /// Row-wise stable softmax with sub-threshold probabilities zeroed.
    fn sparse_softmax(&self, tile: &mut ScoreTile, min_attention: f32);

    /// `O <- O + alpha * O_mem`, in place.
    fn superposition_injection(
        &self,
        o: &mut [f32],
        o_mem: &[f32],
        alpha: f32,
    ) -> Result<(), KernelError>;
}

/// The only kernel backend shipped in this repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuKernels;

impl AccelKernels for CpuKernels {
    fn attention_modifier(&self, tile: &mut ScoreTile, current_pos: i64, lambda: f32, tau: f32) {
        attention_modifier(tile, current_pos, lambda, tau);
    }

    fn sparse_softmax(&self, tile: &mut ScoreTile, min_attention: f32) {
        sparse_softmax(tile, min_attention);
    }

    fn superposition_injection(
        &self,
        o: &mut [f32],
        o_mem: &[f32],
        alpha: f32,
    ) -> Result<(), KernelError> {
        superposition_injection(o, o_mem, alpha)
    }
}
