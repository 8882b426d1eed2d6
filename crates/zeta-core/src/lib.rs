//! Orchestrator for the augmented-memory subsystem: wires the block store,
//! retrieval engine, prefetcher, attention kernels, and policy binding
//! behind one synchronous per-decode-step API.
//!
//! Re-exports the public surface of the other five crates alongside its
//! own [`Orchestrator`], so a host integrating this subsystem depends on a
//! single crate.

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

mod config;
mod error;
mod log_sink;
mod orchestrator;
mod stats;
mod sublimation;

pub use config::{EnvFlagNames, SublimatePolicy, ZetaConfig};
pub use error::ZetaError;
pub use log_sink::{Level, LogSink, NullSink, TracingSink};
pub use orchestrator::Orchestrator;
pub use stats::{OrchestratorStats, StepCounters};
pub use sublimation::SublimationState;

pub use zeta_binding::{decrypt_weights, Binding, BindingConfig, BindingError, ElementKind};
pub use zeta_hash::{sha256, Xoshiro256StarStar};
pub use zeta_kernels::{
    attention_modifier, cosine_similarity as kernel_cosine_similarity, memory_injection,
    sparse_gate, sparse_softmax, superposition_injection, temporal_decay, AccelKernels,
    CpuKernels, KernelError, ScoreTile,
};
pub use zeta_retrieval::{
    link_new_block, refresh_decay, retrieve, score_block, sharpen,
    cosine_similarity as retrieval_cosine_similarity, l2_norm, temporal_weight, PrefetchStats,
    Prefetcher, RetrievalConfig, RetrievalError, RetrievedBlock, MAX_LINKS, MAX_SIMILARITY_LINKS,
    PREDECESSOR_LINK_WEIGHT, TEMPORAL_PREV_HOP_WEIGHT,
};
pub use zeta_store::{
    decode_layer, encode_layer, rebase_positions, relative_positions, Block, BlockId, BlockStore,
    FormatError, GraphKvError, GraphKvHeader, StorageStats, StoreConfig, StoreError, ZetaHeader,
    GRAPH_KV_MAGIC, GRAPH_KV_VERSION, HEADER_SIZE, Q8_0_BLOCK_BYTES, Q8_0_BLOCK_LEN, ZETA_MAGIC,
    ZETA_VERSION,
};
