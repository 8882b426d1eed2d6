//! Typed errors for the retrieval engine.

use thiserror::Error;

/// Errors returned by [`crate::retrieve`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    /// The query vector's dimension did not match the store's configured
    /// `summary_dim`.
    #[error("query dimension mismatch: expected {expected}, got {got}")]
    Dim {
        /// The expected dimension.
        expected: usize,
        /// The dimension actually supplied.
        got: usize,
    },

    /// `top_k` was requested as zero.
    #[error("top_k must be at least 1")]
    ZeroTopK,
}
