//! Configuration record for the orchestrator.
//!
//! Per `spec.md` §9's design note, every tunable the rest of the core reads
//! (including the three documented environment-flag names) lives on this
//! one immutable record, constructed once at startup — never as a
//! process-wide global or an ad hoc environment lookup scattered through
//! helper functions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// The sublimation policy: when and how much of the live KV window is
/// packaged into a new block. Per `spec.md` §4.7.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SublimatePolicy {
    /// Only external calls cause sublimation.
    Manual,
    /// Every time the live KV cache grows by `window` tokens, sublimate the
    /// oldest contiguous `window` tokens.
    Window {
        /// Number of newly-grown tokens that triggers one sublimation.
        window: usize,
    },
    /// When `kv_used / kv_max >= pressure`, sublimate enough of the oldest
    /// tokens to bring usage down to `pressure - 0.1`.
    Pressure {
        /// Trigger fraction, in `(0, 1]`.
        pressure: f32,
    },
    /// Maintain a running importance EMA and sublimate the
    /// lowest-importance contiguous range when `pressure` is reached.
    Attention {
        /// Trigger fraction, in `(0, 1]`.
        pressure: f32,
        /// EMA decay applied to `importance` each step before adding the
        /// latest attention weights, in `(0, 1]`.
        decay: f32,
    },
}

/// Names of the three environment flags `spec.md` §6 documents. Carried as
/// data so a host can override them, rather than hard-coded variable names
/// buried in the orchestrator's init path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvFlagNames {
    /// If this variable is set and not `"0"`, the policy hash check is
    /// bypassed (and the bypass is logged loudly).
    pub dev_mode_env: String,
    /// If set, forces the CPU kernel path regardless of any accelerator
    /// availability.
    pub disable_accel_env: String,
    /// If set, the store does not scan `storage_dir` for pre-existing
    /// blocks at init.
    pub no_load_existing_env: String,
}

impl Default for EnvFlagNames {
    fn default() -> Self {
        Self {
            dev_mode_env: "ZETA_DEV_MODE".to_string(),
            disable_accel_env: "ZETA_DISABLE_ACCEL".to_string(),
            no_load_existing_env: "ZETA_NO_LOAD_EXISTING".to_string(),
        }
    }
}

/// The complete, serde-deserializable configuration for one [`crate::Orchestrator`].
///
/// Every name in `spec.md` §6's configuration enumeration is a field here
/// (or, for the three env flag names, in [`EnvFlagNames`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZetaConfig {
    /// Per-step attention-decay rate lambda; `0.0` disables decay.
    #[serde(default)]
    pub temporal_lambda: f32,
    /// Pre-softmax sparse-gating cutoff tau.
    #[serde(default)]
    pub tunneling_threshold: f32,
    /// Minimum sharpened-cosine x zeta-potential score to admit a block.
    #[serde(default = "default_retrieve_threshold")]
    pub retrieve_threshold: f32,
    /// Coefficient in `q_curr + gamma * (q_curr - q_prev)` for prefetch
    /// prediction.
    #[serde(default)]
    pub momentum_gamma: f32,
    /// Directory `.zeta` files are read from and written to.
    pub storage_dir: PathBuf,
    /// Vector dimension of keys, values, and summaries.
    pub summary_dim: usize,
    /// Maximum number of blocks the store will hold.
    #[serde(default = "default_max_blocks")]
    pub max_blocks: usize,
    /// Maximum number of blocks resident at once.
    #[serde(default = "default_max_active_blocks")]
    pub max_active_blocks: usize,
    /// Number of direct (hop 0) seed blocks a retrieval call selects.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum graph-traversal depth past the seed set.
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Coefficient for memory-injection strength (`alpha` in `spec.md`
    /// §4.6's `superposition_injection`).
    #[serde(default = "default_injection_alpha")]
    pub injection_alpha: f32,
    /// Post-softmax probability floor; lower probabilities are zeroed
    /// without renormalizing.
    #[serde(default)]
    pub min_attention: f32,
    /// Policy document bytes to hash for constitutional binding. Absent ->
    /// the embedded default policy is used.
    #[serde(default)]
    pub constitution_bytes: Option<Vec<u8>>,
    /// The compile-time expected SHA-256 of the policy document. Absent ->
    /// any policy document verifies (local development only; `dev_mode`
    /// should also be set in that case, since there is nothing to check
    /// against).
    #[serde(default)]
    pub expected_policy_hash: Option<[u8; 32]>,
    /// Vocabulary size the binding layer permutes over.
    #[serde(default)]
    pub n_vocab: usize,
    /// Embedding axis count the binding layer permutes over.
    #[serde(default)]
    pub n_embd: usize,
    /// Whether constitutional binding is active at all. `spec.md` treats
    /// binding as optional ("If policy binding is active...").
    #[serde(default)]
    pub binding_enabled: bool,
    /// When `true`, a policy hash mismatch is logged but does not refuse
    /// startup.
    #[serde(default)]
    pub dev_mode: bool,
    /// When `false`, the store does not scan `storage_dir` at init.
    #[serde(default = "default_true")]
    pub load_existing: bool,
    /// The sublimation trigger policy.
    #[serde(default = "default_sublimate_policy")]
    pub sublimate_policy: SublimatePolicy,
    /// Maximum live KV window size the orchestrator tracks usage against,
    /// for `PRESSURE`/`ATTENTION` policies.
    #[serde(default = "default_kv_max")]
    pub kv_max: usize,
    /// Token-count granularity `PRESSURE`/`ATTENTION` round sublimation
    /// ranges up to; also the size of a `WINDOW` policy's default unit.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Names of the environment-flag overrides this config recognizes.
    #[serde(default)]
    pub env_flags: EnvFlagNames,
}

fn default_retrieve_threshold() -> f32 {
    0.1
}
fn default_max_blocks() -> usize {
    65_536
}
fn default_max_active_blocks() -> usize {
    64
}
fn default_top_k() -> usize {
    8
}
fn default_max_hops() -> u32 {
    2
}
fn default_injection_alpha() -> f32 {
    1.0
}
fn default_sublimate_policy() -> SublimatePolicy {
    SublimatePolicy::Manual
}
fn default_kv_max() -> usize {
    4096
}
fn default_block_size() -> usize {
    64
}

impl ZetaConfig {
    /// Parses a JSON configuration document.
    ///
    /// `spec.md` §6 does not mandate a serialization format; JSON is used
    /// here (via `serde_json`, already in the workspace dependency set)
    /// since it requires no additional crate beyond what the teacher's
    /// manifest stack already carries for config and RPC payloads alike.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Builds a config from CLI-flag-shaped string key/value pairs, the way
    /// a thin CLI wrapper (`spec.md` §6's "short/long flags mirroring the
    /// configuration keys") assembles one before handing it to an
    /// [`crate::Orchestrator`]. Keys are the configuration names themselves
    /// (`temporal_lambda`, `storage_dir`, `sublimate_policy`, ...), not the
    /// dashed flag spellings (`--zeta-lambda`) — translating a flag name to
    /// a config key is the wrapper's job, not this crate's.
    ///
    /// Each value is parsed as JSON first (so `"0.1"` becomes a number and
    /// `"true"` a bool) and falls back to a JSON string if that fails, so a
    /// plain path like `/var/zeta` round-trips unquoted.
    pub fn from_args_like_map(
        args: &std::collections::HashMap<String, String>,
    ) -> Result<Self, serde_json::Error> {
        let mut object = serde_json::Map::new();
        for (key, value) in args {
            let parsed = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            object.insert(key.clone(), parsed);
        }
        serde_json::from_value(serde_json::Value::Object(object))
    }

    /// Applies the three documented environment-flag overrides on top of
    /// whatever was loaded from a file, per `spec.md` §6.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(&self.env_flags.dev_mode_env) {
            if !value.is_empty() && value != "0" {
                tracing::warn!(flag = %self.env_flags.dev_mode_env, "dev-mode policy bypass enabled via environment");
                self.dev_mode = true;
            }
        }
        if let Ok(value) = std::env::var(&self.env_flags.no_load_existing_env) {
            if !value.is_empty() && value != "0" {
                self.load_existing = false;
            }
        }
        // `disable_accel_env` has no effect in this repository: only the
        // CPU kernel backend (`zeta_kernels::CpuKernels`) ships, so the
        // flag is accepted (for host compatibility) but is a no-op here.
    }
}
