//! Associative retrieval: scored top-k seeding followed by multi-hop graph
//! expansion over block adjacency and temporal-precedence links.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use zeta_store::{Block, BlockId, BlockStore};

use crate::error::RetrievalError;
use crate::graph::{Candidate, TopK};
use crate::score::{l2_norm, score_block};

/// Weight applied to a `temporal_prev` edge during multi-hop expansion,
/// distinct from (and lower than) the weight a same-topic adjacency edge
/// carries, since mere archive-order adjacency is a weaker relevance signal
/// than a link formed from actual similarity at ingest time.
pub const TEMPORAL_PREV_HOP_WEIGHT: f32 = 0.5;

/// Weight given to the edge from a newly-sublimated block back to its
/// immediate predecessor in archive order.
pub const PREDECESSOR_LINK_WEIGHT: f32 = 0.8;

/// Maximum number of similarity-based edges created per new block, beyond
/// the one predecessor link.
pub const MAX_SIMILARITY_LINKS: usize = 7;

/// Maximum outgoing adjacency entries any block may carry
/// (`MAX_SIMILARITY_LINKS` plus the one predecessor link), per `spec.md`
/// §3's "up to `MAX_LINKS` outgoing entries".
pub const MAX_LINKS: usize = MAX_SIMILARITY_LINKS + 1;

/// Tunables for one [`retrieve`] call.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Number of direct (hop 0) seed blocks selected by score.
    pub top_k: usize,
    /// Maximum number of hops the graph expansion will traverse outward
    /// from the seed set.
    pub max_hops: u32,
    /// Exponential decay constant applied to block age, in decode steps.
    pub decay_lambda: f32,
    /// Minimum sharpened-cosine x zeta-potential score a seed must reach to
    /// be admitted at all. Hop expansion admits at half this threshold.
    pub retrieve_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            max_hops: 2,
            decay_lambda: 0.01,
            retrieve_threshold: 0.1,
        }
    }
}

/// One block surfaced by a retrieval call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetrievedBlock {
    /// The block's identifier.
    pub block_id: BlockId,
    /// Its score at the time of retrieval (sharpened cosine times
    /// `zeta_potential`, attenuated by [`TEMPORAL_PREV_HOP_WEIGHT`] or the
    /// traversed edge weight for every hop past the seed set).
    pub score: f32,
    /// Hop distance from the nearest top-k seed (`0` for a direct hit).
    pub hops: u32,
}

/// Refreshes every block's `zeta_potential` from its `last_access` and the
/// current decode step. Called once per step before scoring, so a step's
/// worth of queries all see a consistent decay snapshot.
pub fn refresh_decay(store: &mut BlockStore, current_step: u64, lambda: f32) {
    let indices: Vec<usize> = (0..store.len()).collect();
    for index in indices {
        if let Some(block) = store.block_mut(index) {
            block.zeta_potential = crate::score::temporal_weight(block.last_access, current_step, lambda);
        }
    }
}

/// Scores every block against `query`, selects the top-k, expands outward
/// through adjacency up to `config.max_hops`, and touches (activates,
/// updates `last_access` on) every block returned.
pub fn retrieve(
    store: &mut BlockStore,
    query: &[f32],
    config: &RetrievalConfig,
    current_step: u64,
) -> Result<Vec<RetrievedBlock>, RetrievalError> {
    if config.top_k == 0 {
        return Err(RetrievalError::ZeroTopK);
    }

    let query_norm = l2_norm(query);
    let mut top = TopK::new(config.top_k);

    for (_, block) in store.iter() {
        if block.summary_dim() != query.len() {
            return Err(RetrievalError::Dim {
                expected: block.summary_dim(),
                got: query.len(),
            });
        }
        let score = score_block(query, query_norm, block);
        if score < config.retrieve_threshold {
            continue;
        }
        top.offer(Candidate {
            score,
            block_id: block.id(),
        });
    }

    let seeds = top.into_sorted_vec();
    let mut visited: HashMap<BlockId, RetrievedBlock> = HashMap::new();
    for candidate in &seeds {
        visited.insert(
            candidate.block_id,
            RetrievedBlock {
                block_id: candidate.block_id,
                score: candidate.score,
                hops: 0,
            },
        );
    }

    let mut frontier: HashSet<BlockId> = seeds.iter().map(|c| c.block_id).collect();
    for hop in 1..=config.max_hops {
        let mut next_frontier = HashSet::new();
        for &parent_id in &frontier {
            let Some(parent_index) = store.index_of(parent_id) else {
                continue;
            };
            let Some(parent) = store.block(parent_index) else {
                continue;
            };
            let parent_score = visited.get(&parent_id).map(|r| r.score).unwrap_or(0.0);

            let mut edges: Vec<(BlockId, f32)> = parent.adjacency.clone();
            if let Some(prev) = parent.temporal_prev {
                edges.push((prev, TEMPORAL_PREV_HOP_WEIGHT));
            }

            for (target_id, weight) in edges {
                let propagated = parent_score * weight * (1.0 / (hop as f32 + 1.0));
                if propagated < config.retrieve_threshold / 2.0 {
                    continue;
                }
                let improved = visited
                    .get(&target_id)
                    .map(|existing| propagated > existing.score)
                    .unwrap_or(true);
                if improved {
                    visited.insert(
                        target_id,
                        RetrievedBlock {
                            block_id: target_id,
                            score: propagated,
                            hops: hop,
                        },
                    );
                    next_frontier.insert(target_id);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    for block_id in visited.keys().copied().collect::<Vec<_>>() {
        if let Some(index) = store.index_of(block_id) {
            store.activate(index).ok();
            if let Some(block) = store.block_mut(index) {
                block.last_access = current_step;
                block.zeta_potential = 1.0;
            }
        }
    }

    let mut results: Vec<RetrievedBlock> = visited.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.block_id.cmp(&b.block_id))
    });

    debug!(
        query_norm,
        returned = results.len(),
        hops = config.max_hops,
        "retrieval complete"
    );

    Ok(results)
}

/// Wires adjacency for a newly-sublimated block, bidirectionally per
/// `spec.md` §4.4 "Edge creation": a `PREDECESSOR_LINK_WEIGHT` edge to/from
/// the block immediately before it in archive order (already recorded as
/// `temporal_prev` by the store), plus up to `MAX_SIMILARITY_LINKS` edges
/// to/from the most similar blocks within the most recent `lookback` blocks
/// whose cosine exceeds `0.7 * retrieve_threshold`, weighted `min(1, cos^2)`.
pub fn link_new_block(store: &mut BlockStore, new_index: usize, lookback: usize, retrieve_threshold: f32) {
    let Some(new_block) = store.block(new_index) else {
        return;
    };
    let new_summary = new_block.summary().to_vec();
    let new_norm = new_block.summary_norm();
    let new_id = new_block.id();
    let predecessor = new_block.temporal_prev;

    let cosine_floor = 0.7 * retrieve_threshold;
    let start = new_index.saturating_sub(lookback);
    let mut scored: Vec<(usize, BlockId, f32)> = Vec::new();
    for index in start..new_index {
        if let Some(candidate) = store.block(index) {
            let cosine = score_cosine_only(&new_summary, new_norm, candidate);
            if cosine > cosine_floor {
                scored.push((index, candidate.id(), (cosine * cosine).min(1.0)));
            }
        }
    }
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(MAX_SIMILARITY_LINKS);

    if let Some(block) = store.block_mut(new_index) {
        block.adjacency.clear();
        if let Some(prev) = predecessor {
            if prev != new_id {
                block.adjacency.push((prev, PREDECESSOR_LINK_WEIGHT));
            }
        }
        for &(_, target, weight) in &scored {
            block.adjacency.push((target, weight));
        }
    }

    if let Some(prev_id) = predecessor {
        if let Some(prev_index) = store.index_of(prev_id) {
            add_reverse_edge(store, prev_index, new_id, PREDECESSOR_LINK_WEIGHT);
        }
    }
    for (index, _, weight) in scored {
        add_reverse_edge(store, index, new_id, weight);
    }
}

/// Adds a `(target_id, weight)` edge to `block_index`'s adjacency, evicting
/// the weakest existing edge first if the block is already at `MAX_LINKS`.
fn add_reverse_edge(store: &mut BlockStore, block_index: usize, target_id: BlockId, weight: f32) {
    let Some(block) = store.block_mut(block_index) else {
        return;
    };
    if block.adjacency.iter().any(|&(id, _)| id == target_id) {
        return;
    }
    if block.adjacency.len() >= MAX_LINKS {
        if let Some((weakest_pos, _)) = block
            .adjacency
            .iter()
            .enumerate()
            .min_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        {
            if block.adjacency[weakest_pos].1 >= weight {
                return;
            }
            block.adjacency.remove(weakest_pos);
        }
    }
    block.adjacency.push((target_id, weight));
}

fn score_cosine_only(summary: &[f32], summary_norm: f32, other: &Block) -> f32 {
    crate::score::cosine_similarity(summary, summary_norm, other.summary(), other.summary_norm())
}
