//! Top-level error type: wraps every crate-local error the orchestrator can
//! surface and classifies each into the exit-code taxonomy a thin CLI
//! wrapper (out of this repository's scope, per `spec.md` §1) would use.

use thiserror::Error;

use zeta_binding::BindingError;
use zeta_kernels::KernelError;
use zeta_retrieval::RetrievalError;
use zeta_store::StoreError;

/// Errors the orchestrator can return, per `spec.md` §7's taxonomy.
#[derive(Debug, Error)]
pub enum ZetaError {
    /// The policy hash did not match and dev-mode was not enabled. Fatal
    /// at init: the host must not fall back to an unbound model.
    #[error("policy binding error: {0}")]
    Binding(#[from] BindingError),

    /// A block-store operation failed (capacity, I/O, or dimension).
    #[error("block store error: {0}")]
    Store(#[from] StoreError),

    /// A retrieval-engine operation failed (query dimension or `top_k`).
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// An attention-kernel operation failed (dimension mismatch).
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// The storage directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZetaError {
    /// Exit-code classification per `spec.md` §6's CLI surface: `1` for
    /// policy mismatch or other init failure, `2` for I/O, `0` otherwise
    /// (never actually constructed for the success case — provided so a
    /// thin CLI wrapper can classify a caught error without reimplementing
    /// this match).
    pub fn exit_code(&self) -> u8 {
        match self {
            ZetaError::Binding(_) => 1,
            ZetaError::Config(_) => 1,
            ZetaError::Io(_) => 2,
            ZetaError::Store(StoreError::Io { .. }) => 2,
            ZetaError::Store(_) => 1,
            ZetaError::Retrieval(_) => 1,
            ZetaError::Kernel(_) => 1,
        }
    }
}
