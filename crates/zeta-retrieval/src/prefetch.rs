//! Query-momentum prefetching: extrapolates where the next query is headed
//! from where the last one came from, so the store can warm likely blocks
//! before they're actually requested.

use zeta_store::BlockStore;

use crate::score::{l2_norm, score_block};

/// Counters surfaced through the orchestrator's statistics.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrefetchStats {
    /// Number of predictions issued.
    pub predictions: u64,
    /// Predictions issued before a second query existed to extrapolate
    /// from (the prediction degenerates to the query itself).
    pub cold_starts: u64,
    /// `MADV_WILLNEED` hints actually issued (i.e. the block was not
    /// already warm and scored above the prefetch floor).
    pub hints_issued: u64,
}

/// Extrapolates `prediction = q_curr + gamma * (q_curr - q_prev)`.
///
/// Keeps only the single previous query vector; momentum beyond one step
/// back is not tracked; `spec.md` §4.4 specifies a first-order
/// extrapolation only.
pub struct Prefetcher {
    gamma: f32,
    q_prev: Option<Vec<f32>>,
    stats: PrefetchStats,
}

impl Prefetcher {
    /// Builds a prefetcher with the given momentum coefficient.
    pub fn new(gamma: f32) -> Self {
        Self {
            gamma,
            q_prev: None,
            stats: PrefetchStats::default(),
        }
    }

    /// Produces the predicted next query vector and records `q_curr` as
    /// `q_prev` for the following call.
    pub fn predict(&mut self, q_curr: &[f32]) -> Vec<f32> {
        self.stats.predictions += 1;

        let prediction = match &self.q_prev {
            Some(prev) if prev.len() == q_curr.len() => q_curr
                .iter()
                .zip(prev.iter())
                .map(|(curr, prev)| curr + self.gamma * (curr - prev))
                .collect(),
            _ => {
                self.stats.cold_starts += 1;
                q_curr.to_vec()
            }
        };

        self.q_prev = Some(q_curr.to_vec());
        prediction
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> PrefetchStats {
        self.stats.clone()
    }

    /// Full pre-decode prefetch step: predicts the next query from
    /// `q_curr`, then for every block not currently warm, scores it
    /// against the prediction and, if the score is at least
    /// `0.7 * retrieve_threshold`, issues a best-effort `MADV_WILLNEED`
    /// hint and marks it warm. Hint failures are silent per `spec.md` §4.5;
    /// this never returns an error.
    pub fn step(&mut self, q_curr: &[f32], store: &mut BlockStore, retrieve_threshold: f32) -> Vec<f32> {
        let prediction = self.predict(q_curr);
        let floor = 0.7 * retrieve_threshold;
        let query_norm = l2_norm(&prediction);

        let candidates: Vec<usize> = store
            .iter()
            .filter(|(_, block)| !block.is_warm)
            .map(|(index, _)| index)
            .collect();

        for index in candidates {
            let Some(block) = store.block(index) else {
                continue;
            };
            if block.summary_dim() != prediction.len() {
                continue;
            }
            let score = score_block(&prediction, query_norm, block);
            if score >= floor && store.hint_warm(index).is_ok() {
                self.stats.hints_issued += 1;
            }
        }

        prediction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_a_cold_start() {
        let mut p = Prefetcher::new(0.5);
        let pred = p.predict(&[1.0, 2.0]);
        assert_eq!(pred, vec![1.0, 2.0]);
        assert_eq!(p.stats().cold_starts, 1);
    }

    #[test]
    fn extrapolates_in_the_direction_of_travel() {
        let mut p = Prefetcher::new(1.0);
        p.predict(&[0.0, 0.0]);
        let pred = p.predict(&[1.0, 0.0]);
        // prediction = curr + gamma * (curr - prev) = [1,0] + 1.0*([1,0]-[0,0])
        assert_eq!(pred, vec![2.0, 0.0]);
    }

    #[test]
    fn zero_gamma_predicts_the_current_query() {
        let mut p = Prefetcher::new(0.0);
        p.predict(&[1.0, 1.0]);
        let pred = p.predict(&[2.0, 2.0]);
        assert_eq!(pred, vec![2.0, 2.0]);
    }

    #[test]
    fn step_warms_blocks_scoring_above_the_prefetch_floor() {
        use zeta_store::{BlockStore, StoreConfig};

        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut store = BlockStore::open(StoreConfig {
            storage_dir: dir.path().to_path_buf(),
            summary_dim: 3,
            max_blocks: 16,
            max_active_blocks: 16,
            load_existing: true,
        })
        .expect("open");

        let matching = store
            .sublimate(0, 1, &[0.0; 3], &[0.0; 3], vec![1.0, 0.0, 0.0])
            .unwrap();
        let orthogonal = store
            .sublimate(1, 1, &[0.0; 3], &[0.0; 3], vec![0.0, 1.0, 0.0])
            .unwrap();

        // A freshly sublimated block is mmap'd (and thus warm) immediately;
        // simulate both having since been evicted back to cold so `step`
        // has something to warm.
        let matching_index = store.index_of(matching).unwrap();
        let orthogonal_index = store.index_of(orthogonal).unwrap();
        store.block_mut(matching_index).unwrap().is_warm = false;
        store.block_mut(orthogonal_index).unwrap().is_warm = false;

        let mut prefetcher = Prefetcher::new(0.0);
        prefetcher.step(&[1.0, 0.0, 0.0], &mut store, 0.1);

        assert!(store.block(matching_index).unwrap().is_warm);
        assert!(!store.block(orthogonal_index).unwrap().is_warm);
        assert_eq!(prefetcher.stats().hints_issued, 1);
    }
}
