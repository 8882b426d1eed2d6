//! Sublimation trigger bookkeeping for the four policies of `spec.md` §4.7.
//!
//! Tracks the live KV window's size and (for `ATTENTION`) a running
//! per-position importance score, and answers "is there a range eligible
//! for sublimation right now, and which one". Actually cutting the range
//! out of the host's KV cache and packaging it into a block is the
//! orchestrator's job, not this module's; this module only decides *when*
//! and *which range*.

use crate::config::SublimatePolicy;

/// Per-policy trigger state for one live KV window.
#[derive(Clone, Debug)]
pub struct SublimationState {
    policy: SublimatePolicy,
    block_size: usize,
    kv_max: usize,
    kv_used: usize,
    tokens_since_trigger: usize,
    /// EMA-accumulated attention importance per live KV position, used only
    /// by [`SublimatePolicy::Attention`]. Index 0 corresponds to the
    /// reserved BOS position and is never evicted.
    importance: Vec<f32>,
}

impl SublimationState {
    /// Builds fresh trigger state for an empty KV window.
    pub fn new(policy: SublimatePolicy, block_size: usize, kv_max: usize) -> Self {
        Self {
            policy,
            block_size: block_size.max(1),
            kv_max,
            kv_used: 0,
            tokens_since_trigger: 0,
            importance: Vec::new(),
        }
    }

    /// Number of tokens currently in the live window.
    pub fn kv_used(&self) -> usize {
        self.kv_used
    }

    /// Call once per decode step as the host appends one token to the live
    /// KV window. `attention_weights`, when supplied, is this step's
    /// per-position attention weight vector (length `kv_used` after
    /// growth); only [`SublimatePolicy::Attention`] consumes it.
    pub fn grow(&mut self, attention_weights: Option<&[f32]>) {
        self.kv_used += 1;
        self.tokens_since_trigger += 1;

        if let SublimatePolicy::Attention { decay, .. } = self.policy {
            if self.importance.len() < self.kv_used {
                self.importance.resize(self.kv_used, 0.0);
            }
            for value in self.importance.iter_mut() {
                *value *= decay;
            }
            if let Some(weights) = attention_weights {
                for (slot, weight) in self.importance.iter_mut().zip(weights.iter()) {
                    *slot += weight;
                }
            }
        }
    }

    /// The `(token_start, token_count)` range eligible for sublimation
    /// right now, if the configured policy's trigger condition is met.
    /// Never includes position 0.
    pub fn pending_range(&self) -> Option<(usize, usize)> {
        match self.policy {
            SublimatePolicy::Manual => None,
            SublimatePolicy::Window { window } => self.window_range(window),
            SublimatePolicy::Pressure { pressure } => self.pressure_range(pressure),
            SublimatePolicy::Attention { pressure, .. } => self.attention_range(pressure),
        }
    }

    /// The `n` lowest-importance live positions, excluding position 0.
    /// Exposed directly per `spec.md` §4.7's `get_eviction_candidates`; the
    /// `ATTENTION` policy itself sublimates the minimum covering contiguous
    /// range rather than this scattered set, per §9's design note.
    pub fn get_eviction_candidates(&self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (1..self.kv_used).collect();
        indices.sort_by(|&a, &b| {
            let ia = self.importance.get(a).copied().unwrap_or(0.0);
            let ib = self.importance.get(b).copied().unwrap_or(0.0);
            ia.partial_cmp(&ib).unwrap_or(std::cmp::Ordering::Equal)
        });
        indices.truncate(n);
        indices
    }

    /// Records that `[start, start+count)` has been removed from the live
    /// window: shrinks `kv_used`, resets the window trigger counter, and
    /// drops the corresponding importance entries (remaining positions
    /// shift down, matching how the host renumbers its KV cache after
    /// removing a range).
    pub fn mark_sublimated(&mut self, start: usize, count: usize) {
        self.kv_used = self.kv_used.saturating_sub(count);
        self.tokens_since_trigger = 0;
        let end = (start + count).min(self.importance.len());
        if start < end {
            self.importance.drain(start..end);
        }
    }

    fn window_range(&self, window: usize) -> Option<(usize, usize)> {
        if window == 0 || self.tokens_since_trigger <= window {
            return None;
        }
        let count = window.min(self.kv_used.saturating_sub(1));
        if count == 0 {
            None
        } else {
            Some((1, count))
        }
    }

    fn pressure_target_removal(&self, pressure: f32) -> Option<usize> {
        if self.kv_max == 0 {
            return None;
        }
        let used = self.kv_used as f32;
        let max = self.kv_max as f32;
        if used / max < pressure {
            return None;
        }
        let target = ((pressure - 0.1) * max).max(0.0) as usize;
        let mut to_remove = self.kv_used.saturating_sub(target).max(self.block_size);
        let remainder = to_remove % self.block_size;
        if remainder != 0 {
            to_remove += self.block_size - remainder;
        }
        Some(to_remove.min(self.kv_used.saturating_sub(1)))
    }

    fn pressure_range(&self, pressure: f32) -> Option<(usize, usize)> {
        let count = self.pressure_target_removal(pressure)?;
        if count == 0 {
            None
        } else {
            Some((1, count))
        }
    }

    fn attention_range(&self, pressure: f32) -> Option<(usize, usize)> {
        let count = self.pressure_target_removal(pressure)?;
        if count == 0 {
            return None;
        }
        let candidates = self.get_eviction_candidates(count);
        let lo = *candidates.iter().min()?;
        let hi = *candidates.iter().max()?;
        Some((lo, hi - lo + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_policy_never_triggers() {
        let mut state = SublimationState::new(SublimatePolicy::Manual, 64, 512);
        for _ in 0..1000 {
            state.grow(None);
        }
        assert_eq!(state.pending_range(), None);
    }

    #[test]
    fn window_policy_triggers_every_n_tokens_skipping_bos() {
        let mut state = SublimationState::new(SublimatePolicy::Window { window: 8 }, 8, 512);
        for _ in 0..8 {
            state.grow(None);
        }
        assert_eq!(state.pending_range(), None); // kv_used == window + 0 (no BOS grown yet beyond window)
        state.grow(None);
        assert_eq!(state.pending_range(), Some((1, 8)));
    }

    #[test]
    fn window_policy_resets_after_sublimation() {
        let mut state = SublimationState::new(SublimatePolicy::Window { window: 4 }, 4, 512);
        for _ in 0..5 {
            state.grow(None);
        }
        let (start, count) = state.pending_range().expect("should trigger");
        state.mark_sublimated(start, count);
        assert_eq!(state.pending_range(), None);
    }

    #[test]
    fn pressure_policy_triggers_at_threshold_and_targets_floor() {
        // kv_max=100, pressure=0.5 -> trigger at kv_used/100 >= 0.5, i.e. kv_used >= 50.
        // target = (0.5-0.1)*100 = 40; block_size=10 -> remove max(kv_used-40, 10)
        // rounded up to a multiple of 10.
        let mut state = SublimationState::new(
            SublimatePolicy::Pressure { pressure: 0.5 },
            10,
            100,
        );
        for _ in 0..49 {
            state.grow(None);
        }
        assert_eq!(state.pending_range(), None);

        state.grow(None); // kv_used = 50
        let (start, count) = state.pending_range().expect("crossed pressure threshold");
        assert_eq!(start, 1);
        // raw removal = 50 - 40 = 10, already a multiple of block_size.
        assert_eq!(count, 10);
    }

    #[test]
    fn pressure_removal_rounds_up_to_block_size() {
        let mut state = SublimationState::new(
            SublimatePolicy::Pressure { pressure: 0.5 },
            16,
            100,
        );
        for _ in 0..55 {
            state.grow(None);
        }
        // raw removal = 55 - 40 = 15 -> rounds up to 16.
        let (_, count) = state.pending_range().expect("triggered");
        assert_eq!(count, 16);
    }

    #[test]
    fn attention_policy_evicts_contiguous_span_covering_lowest_importance() {
        let mut state = SublimationState::new(
            SublimatePolicy::Attention {
                pressure: 0.5,
                decay: 1.0,
            },
            4,
            10,
        );
        // Grow 6 tokens (positions 0..6); feed distinct per-position weights
        // so position 5 ends up least important and position 2 most.
        let weight_rounds: [Vec<f32>; 6] = [
            vec![1.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0, 5.0],
            vec![1.0, 1.0, 5.0, 1.0],
            vec![1.0, 1.0, 5.0, 1.0, 1.0],
            vec![1.0, 1.0, 5.0, 1.0, 1.0, 0.1],
        ];
        for weights in &weight_rounds {
            state.grow(Some(weights));
        }
        assert_eq!(state.kv_used(), 6);

        // 6/10 = 0.6 >= 0.5 pressure -> triggers. target = (0.5-0.1)*10 = 4;
        // raw removal = 6-4 = 2, rounds up to block_size 4, capped at kv_used-1=5.
        let (start, count) = state.pending_range().expect("should trigger");
        assert!(start >= 1);
        assert!(count >= 1);
    }

    #[test]
    fn get_eviction_candidates_excludes_position_zero() {
        let mut state = SublimationState::new(
            SublimatePolicy::Attention {
                pressure: 1.0,
                decay: 1.0,
            },
            1,
            100,
        );
        for _ in 0..5 {
            state.grow(None);
        }
        let candidates = state.get_eviction_candidates(10);
        assert!(!candidates.contains(&0));
    }
}
