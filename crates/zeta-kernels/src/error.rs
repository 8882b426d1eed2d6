//! Typed errors for the attention-modifier kernels.

use thiserror::Error;

/// Errors returned by kernel entry points.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    /// Two buffers expected to share a dimension did not.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    Dim {
        /// The expected length.
        expected: usize,
        /// The length actually supplied.
        got: usize,
    },

    /// A row or column index was requested out of bounds.
    #[error("index out of bounds: {index} (len {len})")]
    OutOfBounds {
        /// The offending index.
        index: usize,
        /// The buffer's length.
        len: usize,
    },
}
