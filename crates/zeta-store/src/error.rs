//! Typed errors surfaced by the block store, per `spec.md` §7.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::BlockStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The block count would exceed the configured capacity.
    #[error("block capacity exceeded: {limit} blocks already stored")]
    Capacity {
        /// The configured limit.
        limit: usize,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// The file the error occurred on.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The caller-supplied `summary_dim` does not match the store's
    /// configured dimension.
    #[error("dimension mismatch: store configured for {expected}, got {got}")]
    Dim {
        /// The store's configured dimension.
        expected: usize,
        /// The dimension supplied by the caller.
        got: usize,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
