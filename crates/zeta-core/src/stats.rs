//! Aggregated statistics surface for one [`crate::Orchestrator`].

use zeta_retrieval::PrefetchStats;
use zeta_store::StorageStats;

/// Per-decode-step counters the orchestrator accumulates itself, on top of
/// what the store and prefetcher already track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepCounters {
    /// Number of `pre_decode_hook` calls made.
    pub decode_steps: u64,
    /// Total blocks returned across every retrieval call.
    pub blocks_retrieved: u64,
    /// Total blocks packaged via `sublimate`.
    pub blocks_sublimated: u64,
}

/// A point-in-time snapshot combining [`StorageStats`], [`PrefetchStats`],
/// and [`StepCounters`] behind one call, so a host polling for telemetry
/// does not need to know which subsystem owns which counter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrchestratorStats {
    /// Block-store residency and I/O counters.
    pub storage: StorageStats,
    /// Prefetcher prediction and hint counters.
    pub prefetch: PrefetchStats,
    /// Orchestrator-level per-step counters.
    pub steps: StepCounters,
}
