//! Policy binding: derives vocabulary/embedding permutations from the hash
//! of a policy document, and applies them to logits, tokens, and weights.

use zeta_hash::{sha256, Xoshiro256StarStar};

use crate::config::BindingConfig;
use crate::error::BindingError;

/// A constant XORed into the policy hash before deriving the embedding
/// permutation's seed, so the vocabulary and embedding permutations are
/// independent even though they are derived from the same policy hash.
const EMBD_SEED_CONSTANT: [u8; 32] = [0x5A; 32];

/// An immutable record created once at startup, per `spec.md` §3.
#[derive(Clone, Debug)]
pub struct Binding {
    /// SHA-256 of the policy bytes.
    pub hash: [u8; 32],
    /// Seed derived from the first 8 bytes of `hash` (little-endian).
    pub seed: u64,
    /// Permutation over vocabulary indices.
    pub vocab_perm: Vec<u32>,
    /// Positional inverse of `vocab_perm`.
    pub vocab_inv: Vec<u32>,
    /// Permutation over embedding axes.
    pub embd_perm: Vec<u32>,
    /// Positional inverse of `embd_perm`.
    pub embd_inv: Vec<u32>,
    /// `true` iff `hash` matched the compiled-in expected value, or
    /// dev-mode was enabled.
    pub verified: bool,
}

impl Binding {
    /// Computes the policy hash, compares it against `config.expected_hash`,
    /// and derives both permutations.
    ///
    /// Returns [`BindingError::BadHash`] when the hash does not match and
    /// `config.dev_mode` is `false`; the system must not start bound to the
    /// wrong policy.
    pub fn init(policy_bytes: &[u8], config: &BindingConfig) -> Result<Self, BindingError> {
        let hash = sha256(policy_bytes);
        let matches_expected = hash == config.expected_hash;

        if !matches_expected && !config.dev_mode {
            return Err(BindingError::BadHash);
        }

        let seed = u64::from_le_bytes([
            hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
        ]);

        let mut vocab_rng = Xoshiro256StarStar::from_hash(&hash);
        let (vocab_perm, vocab_inv) = vocab_rng.permutation(config.n_vocab);

        let mut embd_hash = hash;
        for (byte, constant) in embd_hash.iter_mut().zip(EMBD_SEED_CONSTANT.iter()) {
            *byte ^= constant;
        }
        let embd_seed_hash = sha256(embd_hash);
        let mut embd_rng = Xoshiro256StarStar::from_hash(&embd_seed_hash);
        let (embd_perm, embd_inv) = embd_rng.permutation(config.n_embd);

        Ok(Self {
            hash,
            seed,
            vocab_perm,
            vocab_inv,
            embd_perm,
            embd_inv,
            verified: matches_expected || config.dev_mode,
        })
    }

    /// In-place: `out[i] = logits[vocab_perm[i]]`.
    pub fn bind_logits(&self, logits: &mut [f32]) -> Result<(), BindingError> {
        self.check_vocab_dim(logits.len())?;
        let permuted: Vec<f32> = self
            .vocab_perm
            .iter()
            .map(|&src| logits[src as usize])
            .collect();
        logits.copy_from_slice(&permuted);
        Ok(())
    }

    /// `vocab_inv[t]`: the canonical token the host is to emit for a token
    /// sampled from bound-space logits.
    pub fn unbind_token(&self, t: u32) -> Result<u32, BindingError> {
        self.vocab_inv
            .get(t as usize)
            .copied()
            .ok_or(BindingError::Dim {
                expected: self.vocab_inv.len(),
                got: t as usize + 1,
            })
    }

    /// `vocab_perm[t]`: bound-space token for prompt encoding.
    pub fn bind_token(&self, t: u32) -> Result<u32, BindingError> {
        self.vocab_perm
            .get(t as usize)
            .copied()
            .ok_or(BindingError::Dim {
                expected: self.vocab_perm.len(),
                got: t as usize + 1,
            })
    }

    /// Row-permutes `weights` (`n_vocab` rows of `n_embd` columns, row-major)
    /// by `vocab_perm`, for model preparation.
    pub fn permute_output_weights(&self, weights: &mut [f32]) -> Result<(), BindingError> {
        self.permute_rows(weights, &self.vocab_perm)
    }

    /// Exact inverse of [`Self::permute_output_weights`].
    pub fn restore_output_weights(&self, weights: &mut [f32]) -> Result<(), BindingError> {
        self.permute_rows(weights, &self.vocab_inv)
    }

    fn permute_rows(&self, weights: &mut [f32], perm: &[u32]) -> Result<(), BindingError> {
        let n_embd = self.embd_perm.len().max(1);
        if weights.len() != perm.len() * n_embd {
            return Err(BindingError::Dim {
                expected: perm.len() * n_embd,
                got: weights.len(),
            });
        }
        let mut permuted = vec![0f32; weights.len()];
        for (dst_row, &src_row) in perm.iter().enumerate() {
            let src_start = src_row as usize * n_embd;
            let dst_start = dst_row * n_embd;
            permuted[dst_start..dst_start + n_embd]
                .copy_from_slice(&weights[src_start..src_start + n_embd]);
        }
        weights.copy_from_slice(&permuted);
        Ok(())
    }

    fn check_vocab_dim(&self, got: usize) -> Result<(), BindingError> {
        if got != self.vocab_perm.len() {
            return Err(BindingError::Dim {
                expected: self.vocab_perm.len(),
                got,
            });
        }
        Ok(())
    }
}
