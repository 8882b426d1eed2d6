//! Content-addressed, memory-mapped `.zeta` block archive.
//!
//! A [`BlockStore`] packages excerpts of a model's KV cache into immutable,
//! mmap'd files and keeps a bounded number of them resident at once,
//! evicting the least-recently-activated block when the active set is full.
//! Persisted state is the `.zeta` files themselves; block adjacency and
//! temporal-decay weights are runtime-only and are rebuilt by the retrieval
//! engine each session.

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

mod block;
mod error;
mod format;
mod graph_kv;
mod store;

pub use block::{Block, BlockId};
pub use error::StoreError;
pub use format::{FormatError, ZetaHeader, HEADER_SIZE, ZETA_MAGIC, ZETA_VERSION};
pub use graph_kv::{
    decode_layer, encode_layer, rebase_positions, relative_positions, GraphKvError,
    GraphKvHeader, GRAPH_KV_MAGIC, GRAPH_KV_VERSION, Q8_0_BLOCK_BYTES, Q8_0_BLOCK_LEN,
};
pub use store::{BlockStore, StoreConfig, StorageStats};
