#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! Constitutional binding.
//!
//! Derives a deterministic permutation of the logits/embedding axes (and,
//! optionally, a weight XOR keystream) from the SHA-256 hash of a policy
//! document. Operation without the exact policy bytes produces a uniformly
//! random permutation — sampling from permuted logits then behaves like
//! sampling from a different model entirely.

mod binding;
mod config;
mod error;
mod weights;

pub use binding::Binding;
pub use config::BindingConfig;
pub use error::BindingError;
pub use weights::{decrypt_weights, ElementKind};
