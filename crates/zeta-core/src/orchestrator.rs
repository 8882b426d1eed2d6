//! Wires the block store, retrieval engine, prefetcher, attention kernels,
//! and policy binding into the per-decode-step API.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use zeta_binding::{Binding, BindingConfig};
use zeta_kernels::{memory_injection, superposition_injection, AccelKernels, CpuKernels, ScoreTile};
use zeta_retrieval::{
    link_new_block, refresh_decay, retrieve, Prefetcher, RetrievalConfig, RetrievedBlock,
};
use zeta_store::{BlockStore, StoreConfig};

use crate::config::ZetaConfig;
use crate::error::ZetaError;
use crate::log_sink::{Level, LogSink, NullSink};
use crate::stats::{OrchestratorStats, StepCounters};
use crate::sublimation::SublimationState;

/// Policy document used when [`ZetaConfig::constitution_bytes`] is absent.
/// A real deployment supplies its own document; this placeholder exists so
/// `binding_enabled` configs still have *something* deterministic to hash
/// in tests and local development.
const DEFAULT_POLICY: &[u8] = b"zeta-default-policy-v1";

struct Inner {
    store: BlockStore,
    retrieval_config: RetrievalConfig,
    prefetcher: Prefetcher,
    sublimation: SublimationState,
    current_step: u64,
    last_retrieved: Vec<RetrievedBlock>,
    last_query: Vec<f32>,
    steps: StepCounters,
}

/// Owns one augmented-memory subsystem instance for a single model/session.
///
/// All mutable state lives behind a single coarse-grained lock, per
/// `spec.md` §5's locking discipline ("a single coarse-grained lock
/// protecting the store suffices"); hooks take `&self` so a host may hold
/// one `Orchestrator` behind an `Arc` if its decode loop spans threads,
/// though `spec.md` itself only requires synchronous, single-threaded
/// hook calls.
pub struct Orchestrator {
    config: ZetaConfig,
    binding: Option<Binding>,
    kernels: CpuKernels,
    log_sink: Box<dyn LogSink>,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Opens the block store at `config.storage_dir`, establishes policy
    /// binding if `config.binding_enabled`, and returns a ready-to-use
    /// orchestrator with a discarding [`NullSink`].
    ///
    /// Use [`Orchestrator::with_log_sink`] to supply a host-provided sink.
    pub fn new(config: ZetaConfig) -> Result<Self, ZetaError> {
        Self::with_log_sink(config, Box::new(NullSink))
    }

    /// As [`Orchestrator::new`], routing host-visible log events to `sink`.
    pub fn with_log_sink(config: ZetaConfig, sink: Box<dyn LogSink>) -> Result<Self, ZetaError> {
        let store = BlockStore::open(StoreConfig {
            storage_dir: config.storage_dir.clone(),
            summary_dim: config.summary_dim,
            max_blocks: config.max_blocks,
            max_active_blocks: config.max_active_blocks,
            load_existing: config.load_existing,
        })?;

        let binding = if config.binding_enabled {
            let policy_bytes = config
                .constitution_bytes
                .clone()
                .unwrap_or_else(|| DEFAULT_POLICY.to_vec());
            let expected_hash = config.expected_policy_hash.unwrap_or_else(|| {
                warn!("binding_enabled with no expected_policy_hash configured; any policy document will verify");
                zeta_hash::sha256(&policy_bytes)
            });
            let binding_config = BindingConfig {
                expected_hash,
                dev_mode: config.dev_mode,
                n_vocab: config.n_vocab,
                n_embd: config.n_embd,
            };
            let binding = Binding::init(&policy_bytes, &binding_config)?;
            if !binding.verified {
                warn!("policy hash mismatch accepted under dev_mode");
            }
            sink.event(
                Level::Info,
                "policy binding established",
                &[("verified", &binding.verified.to_string())],
            );
            Some(binding)
        } else {
            None
        };

        let retrieval_config = RetrievalConfig {
            top_k: config.top_k,
            max_hops: config.max_hops,
            decay_lambda: config.temporal_lambda,
            retrieve_threshold: config.retrieve_threshold,
        };

        let inner = Inner {
            store,
            retrieval_config,
            prefetcher: Prefetcher::new(config.momentum_gamma),
            sublimation: SublimationState::new(config.sublimate_policy, config.block_size, config.kv_max),
            current_step: 0,
            last_retrieved: Vec::new(),
            last_query: Vec::new(),
            steps: StepCounters::default(),
        };

        Ok(Self {
            config,
            binding,
            kernels: CpuKernels,
            log_sink: sink,
            inner: Mutex::new(inner),
        })
    }

    /// The constitutional binding, if active.
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// The kernel backend driving attention modification. Always
    /// [`CpuKernels`] in this repository; exposed so a caller can invoke
    /// kernel operations directly without reaching into `zeta_kernels`.
    pub fn kernels(&self) -> &CpuKernels {
        &self.kernels
    }

    /// Applies temporal decay, the sparse-gating attention modifier, and the
    /// sparse-softmax safeguard to `tile` using this orchestrator's
    /// configured `temporal_lambda`, `tunneling_threshold`, and
    /// `min_attention`, so a host's attention loop does not need to thread
    /// those three tunables through by hand.
    pub fn apply_attention_modifier(&self, tile: &mut ScoreTile, current_pos: i64) {
        self.kernels.attention_modifier(
            tile,
            current_pos,
            self.config.temporal_lambda,
            self.config.tunneling_threshold,
        );
        zeta_kernels::sparse_softmax(tile, self.config.min_attention);
    }

    /// Per `spec.md` §4.7's pre-decode hook: computes the mean query vector
    /// across attention heads, runs prefetch prediction/warming, applies
    /// temporal decay to every block, retrieves and activates the top-k
    /// (plus graph-expanded) set, and advances the step counter and
    /// generation in lockstep.
    ///
    /// `query_heads` is one query vector per attention head, each of
    /// length `config.summary_dim`; they are mean-pooled before scoring.
    pub fn pre_decode_hook(&self, query_heads: &[Vec<f32>]) -> Result<Vec<RetrievedBlock>, ZetaError> {
        let query = mean_pool(query_heads, self.config.summary_dim);

        let mut inner = self.inner.lock();
        inner.store.advance_generation();

        refresh_decay(&mut inner.store, inner.current_step, self.config.temporal_lambda);
        inner
            .prefetcher
            .step(&query, &mut inner.store, self.config.retrieve_threshold);

        let retrieved = retrieve(
            &mut inner.store,
            &query,
            &inner.retrieval_config,
            inner.current_step,
        )?;

        debug!(
            step = inner.current_step,
            retrieved = retrieved.len(),
            "pre-decode hook complete"
        );
        self.log_sink.event(
            Level::Debug,
            "pre-decode hook",
            &[("retrieved", &retrieved.len().to_string())],
        );

        inner.steps.decode_steps += 1;
        inner.steps.blocks_retrieved += retrieved.len() as u64;
        inner.current_step += 1;
        inner.last_retrieved = retrieved.clone();
        inner.last_query = query;

        Ok(retrieved)
    }

    /// Per `spec.md` §4.7's post-attention hook: if the last
    /// [`Orchestrator::pre_decode_hook`] call returned any blocks, computes
    /// each one's superposition contribution and injects the sum into
    /// `output` (length `config.summary_dim`) for the final sequence
    /// position, then clears the pending set so a second call without an
    /// intervening `pre_decode_hook` is a no-op.
    pub fn post_attention_hook(&self, output: &mut [f32]) -> Result<(), ZetaError> {
        let mut inner = self.inner.lock();
        if inner.last_retrieved.is_empty() {
            return Ok(());
        }

        let dim = self.config.summary_dim;
        let query = inner.last_query.clone();
        let mut o_mem = vec![0.0f32; dim];

        for retrieved in inner.last_retrieved.clone() {
            let Some(index) = inner.store.index_of(retrieved.block_id) else {
                continue;
            };
            let Some(block) = inner.store.block(index) else {
                continue;
            };
            let (Some(keys), Some(values)) = (block.keys(), block.values()) else {
                continue;
            };
            let contribution = memory_injection(&query, &keys, &values, dim, retrieved.score)?;
            for (acc, c) in o_mem.iter_mut().zip(contribution.iter()) {
                *acc += c;
            }
        }

        superposition_injection(output, &o_mem, self.config.injection_alpha)?;

        inner.last_retrieved.clear();
        Ok(())
    }

    /// Call once per decode step as the host appends one token to its live
    /// KV window, so the configured sublimation policy's trigger state
    /// stays current. `attention_weights`, if supplied, feeds the
    /// `ATTENTION` policy's importance EMA.
    pub fn note_token_grown(&self, attention_weights: Option<&[f32]>) {
        self.inner.lock().sublimation.grow(attention_weights);
    }

    /// The `(token_start, token_count)` range the configured sublimation
    /// policy wants packaged right now, if any. The host slices its own
    /// KV cache to this range and passes the keys/values to
    /// [`Orchestrator::sublimate`].
    pub fn pending_sublimation(&self) -> Option<(usize, usize)> {
        self.inner.lock().sublimation.pending_range()
    }

    /// Packages `keys`/`values` (`token_count * summary_dim` floats each,
    /// row-major) covering `[token_start, token_start+token_count)` into a
    /// new block, wires its adjacency against the most recent `lookback`
    /// blocks, and informs the sublimation tracker the range has been
    /// removed from the live window.
    ///
    /// `summary`, if absent, is the mean-pooled key vector (`spec.md`
    /// §4.3's "compute summary if absent").
    pub fn sublimate(
        &self,
        token_start: i64,
        token_count: i64,
        keys: &[f32],
        values: &[f32],
        summary: Option<Vec<f32>>,
        lookback: usize,
    ) -> Result<zeta_store::BlockId, ZetaError> {
        let mut inner = self.inner.lock();
        let dim = self.config.summary_dim;
        let summary = summary.unwrap_or_else(|| mean_pool_rows(keys, dim));

        let block_id = inner.store.sublimate(token_start, token_count, keys, values, summary)?;
        let index = inner.store.index_of(block_id).unwrap_or(usize::MAX);
        link_new_block(&mut inner.store, index, lookback, self.config.retrieve_threshold);

        inner
            .sublimation
            .mark_sublimated(token_start as usize, token_count as usize);
        inner.steps.blocks_sublimated += 1;

        info!(block_id, token_start, token_count, "block sublimated");
        self.log_sink.event(
            Level::Info,
            "block sublimated",
            &[("block_id", &block_id.to_string())],
        );

        Ok(block_id)
    }

    /// `n` lowest-importance live KV positions under the configured policy
    /// (meaningful for `ATTENTION`; empty for the other three policies,
    /// which track no per-position importance).
    pub fn eviction_candidates(&self, n: usize) -> Vec<usize> {
        self.inner.lock().sublimation.get_eviction_candidates(n)
    }

    /// Binds `logits` into the permuted space before sampling. A no-op
    /// returning `logits` unchanged (well, copied) if no binding is active.
    pub fn bind_logits_before_sample(&self, logits: &mut [f32]) -> Result<(), ZetaError> {
        if let Some(binding) = &self.binding {
            binding.bind_logits(logits)?;
        }
        Ok(())
    }

    /// Inverse-permutes a token sampled from bound-space logits back to
    /// the canonical vocabulary, per `spec.md` §4.2's semantic contract. A
    /// no-op returning `token` unchanged if no binding is active.
    pub fn unbind_sampled_token(&self, token: u32) -> Result<u32, ZetaError> {
        match &self.binding {
            Some(binding) => Ok(binding.unbind_token(token)?),
            None => Ok(token),
        }
    }

    /// Aggregated statistics snapshot.
    pub fn stats(&self) -> OrchestratorStats {
        let inner = self.inner.lock();
        OrchestratorStats {
            storage: inner.store.stats(),
            prefetch: inner.prefetcher.stats(),
            steps: inner.steps.clone(),
        }
    }
}

fn mean_pool(heads: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut acc = vec![0.0f32; dim];
    let mut count = 0usize;
    for head in heads {
        if head.len() != dim {
            continue;
        }
        for (a, v) in acc.iter_mut().zip(head.iter()) {
            *a += v;
        }
        count += 1;
    }
    if count > 0 {
        for a in acc.iter_mut() {
            *a /= count as f32;
        }
    }
    acc
}

fn mean_pool_rows(flat: &[f32], dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }
    let rows = flat.len() / dim;
    let mut acc = vec![0.0f32; dim];
    for r in 0..rows {
        let start = r * dim;
        let Some(row) = flat.get(start..start + dim) else {
            break;
        };
        for (a, v) in acc.iter_mut().zip(row.iter()) {
            *a += v;
        }
    }
    if rows > 0 {
        for a in acc.iter_mut() {
            *a /= rows as f32;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &std::path::Path) -> ZetaConfig {
        ZetaConfig {
            temporal_lambda: 0.0,
            tunneling_threshold: 0.0,
            retrieve_threshold: 0.0,
            momentum_gamma: 0.5,
            storage_dir: dir.to_path_buf(),
            summary_dim: 3,
            max_blocks: 64,
            max_active_blocks: 64,
            top_k: 4,
            max_hops: 1,
            injection_alpha: 1.0,
            min_attention: 0.0,
            constitution_bytes: None,
            expected_policy_hash: None,
            n_vocab: 0,
            n_embd: 0,
            binding_enabled: false,
            dev_mode: true,
            load_existing: true,
            sublimate_policy: crate::config::SublimatePolicy::Manual,
            kv_max: 4096,
            block_size: 64,
            env_flags: Default::default(),
        }
    }

    #[test]
    fn sublimate_then_retrieve_round_trips_through_the_orchestrator() {
        let dir = TempDir::new().expect("tempdir");
        let orchestrator = Orchestrator::new(config(dir.path())).expect("build");

        let keys = vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let values = vec![2.0, 0.0, 0.0, 0.0, 0.0, 2.0];
        let id = orchestrator
            .sublimate(0, 2, &keys, &values, None, 8)
            .expect("sublimate");
        assert_eq!(id, 0);

        let retrieved = orchestrator
            .pre_decode_hook(&[vec![1.0, 0.0, 0.0]])
            .expect("pre decode");
        assert!(retrieved.iter().any(|r| r.block_id == 0));

        let mut output = vec![0.0f32; 3];
        orchestrator.post_attention_hook(&mut output).expect("post attention");
        assert!(output.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn stats_reflect_sublimation_and_retrieval_activity() {
        let dir = TempDir::new().expect("tempdir");
        let orchestrator = Orchestrator::new(config(dir.path())).expect("build");

        orchestrator
            .sublimate(0, 1, &[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0], None, 8)
            .expect("sublimate");
        orchestrator
            .pre_decode_hook(&[vec![1.0, 0.0, 0.0]])
            .expect("pre decode");

        let stats = orchestrator.stats();
        assert_eq!(stats.steps.blocks_sublimated, 1);
        assert_eq!(stats.steps.decode_steps, 1);
        assert!(stats.steps.blocks_retrieved >= 1);
    }

    #[test]
    fn unbind_sampled_token_is_identity_without_binding() {
        let dir = TempDir::new().expect("tempdir");
        let orchestrator = Orchestrator::new(config(dir.path())).expect("build");
        assert_eq!(orchestrator.unbind_sampled_token(42).unwrap(), 42);
    }

    #[test]
    fn binding_enabled_with_matching_hash_verifies() {
        let dir = TempDir::new().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.binding_enabled = true;
        cfg.n_vocab = 8;
        cfg.n_embd = 4;
        cfg.constitution_bytes = Some(b"test policy".to_vec());
        cfg.expected_policy_hash = Some(zeta_hash::sha256(b"test policy"));

        let orchestrator = Orchestrator::new(cfg).expect("build");
        assert!(orchestrator.binding().expect("binding active").verified);
    }

    #[test]
    fn bad_policy_hash_without_dev_mode_refuses_to_start() {
        let dir = TempDir::new().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.binding_enabled = true;
        cfg.dev_mode = false;
        cfg.n_vocab = 8;
        cfg.n_embd = 4;
        cfg.constitution_bytes = Some(b"test policy".to_vec());
        cfg.expected_policy_hash = Some([7u8; 32]);

        let err = Orchestrator::new(cfg).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn sublimation_range_is_exposed_before_being_consumed() {
        let dir = TempDir::new().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.sublimate_policy = crate::config::SublimatePolicy::Window { window: 2 };
        let orchestrator = Orchestrator::new(cfg).expect("build");

        orchestrator.note_token_grown(None);
        assert_eq!(orchestrator.pending_sublimation(), None);
        orchestrator.note_token_grown(None);
        orchestrator.note_token_grown(None);
        assert_eq!(orchestrator.pending_sublimation(), Some((1, 2)));
    }
}
