#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! SHA-256 and the two deterministic PRNGs the rest of the workspace derives
//! permutations and weight masks from.
//!
//! Everything here is pure and infallible: there is no I/O, no global state,
//! and (outside tests) no panics.

mod prng;
mod sha256;

pub use prng::{mask_word, Xoshiro256StarStar};
pub use sha256::sha256;
