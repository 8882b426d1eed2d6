//! Priority-queue plumbing for top-k selection and multi-hop expansion.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use zeta_store::BlockId;

/// A scored candidate block, ordered by score descending and then by
/// `block_id` ascending so ties resolve deterministically regardless of
/// iteration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub score: f32,
    pub block_id: BlockId,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.block_id.cmp(&self.block_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `k` highest-scoring candidates seen so far, evicting the
/// current worst once full. A max-heap would hand back the best item
/// first; retrieval wants the opposite (cheaply reject candidates worse
/// than the current floor), so this wraps a min-heap via `Reverse`-style
/// inverted comparison on [`Candidate`].
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<std::cmp::Reverse<Candidate>>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.max(1)),
        }
    }

    pub fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.k {
            self.heap.push(std::cmp::Reverse(candidate));
            return;
        }
        if let Some(std::cmp::Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(std::cmp::Reverse(candidate));
            }
        }
    }

    /// Drains the held candidates, best (highest score) first.
    pub fn into_sorted_vec(self) -> Vec<Candidate> {
        let mut items: Vec<Candidate> = self.heap.into_iter().map(|r| r.0).collect();
        items.sort_by(|a, b| b.cmp(a));
        items
    }
}
