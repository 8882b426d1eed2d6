//! Configuration record for the binding layer.
//!
//! Per `spec.md` §9's design note, the compiled-in expected hash and the
//! dev-mode bypass live on this record rather than as process-wide globals
//! or scattered environment checks.

/// Configuration consumed by [`crate::Binding::init`].
#[derive(Clone, Debug)]
pub struct BindingConfig {
    /// The SHA-256 hash the policy document is expected to hash to.
    ///
    /// In production this is a compiled-in constant; tests and development
    /// builds may supply an arbitrary value here instead.
    pub expected_hash: [u8; 32],
    /// When `true`, a hash mismatch is logged but does not refuse startup.
    pub dev_mode: bool,
    /// Size of the vocabulary permutation.
    pub n_vocab: usize,
    /// Size of the embedding permutation.
    pub n_embd: usize,
}

impl BindingConfig {
    /// Builds a config whose `expected_hash` is derived from `policy_bytes`
    /// itself, i.e. any policy document verifies. Useful for tests and
    /// local development where there is no fixed compiled-in policy.
    pub fn accepting_any(n_vocab: usize, n_embd: usize) -> Self {
        Self {
            expected_hash: [0u8; 32],
            dev_mode: true,
            n_vocab,
            n_embd,
        }
    }
}
