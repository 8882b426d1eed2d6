//! Local error types for `zeta-binding`.

use thiserror::Error;

/// Errors produced while establishing or using a [`crate::Binding`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The policy hash did not match the compiled-in expected hash and
    /// dev-mode was not enabled.
    #[error("policy hash mismatch: binding refused to initialize")]
    BadHash,

    /// A caller-supplied dimension did not match the binding's configured
    /// vocabulary or embedding dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    Dim {
        /// The dimension the binding was constructed with.
        expected: usize,
        /// The dimension the caller supplied.
        got: usize,
    },
}
