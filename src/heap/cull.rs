//! Fixed-capacity top-k heap keyed by traversal score.
//!
//! The root holds the weakest retained entry. A candidate displaces the
//! root only when it scores strictly higher, so the heap ends a traversal
//! holding the `k` best `(vertex, predicator)` pairs it was offered. The
//! storage is allocated once per program binding and reused across
//! evaluations without further allocation.

use crate::core::{Predicator, VertexRef};

/// One cull heap slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcHeadHeapItem {
    pub score: f64,
    pub vertex: Option<VertexRef>,
    pub predicator: Predicator,
}

impl ArcHeadHeapItem {
    pub const EMPTY: ArcHeadHeapItem = ArcHeadHeapItem { score: 0.0, vertex: None, predicator: Predicator::NONE };
}

#[derive(Debug, Clone, Default)]
pub struct CullHeap {
    slots: Vec<ArcHeadHeapItem>,
}

impl CullHeap {
    pub fn new(capacity: usize) -> Self {
        Self { slots: vec![ArcHeadHeapItem::EMPTY; capacity] }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Empty every slot, keeping the capacity.
    pub fn reset(&mut self) {
        self.slots.fill(ArcHeadHeapItem::EMPTY);
    }

    /// Weakest retained score, the bar a candidate must clear.
    pub fn threshold(&self) -> Option<f64> {
        self.slots.first().map(|s| s.score)
    }

    /// Offer a candidate. Returns 1 when admitted, 0 when it does not beat
    /// the root, -1 when the heap has no capacity.
    pub fn try_replace(&mut self, item: ArcHeadHeapItem) -> i64 {
        let k = self.slots.len();
        let Some(root) = self.slots.first_mut() else {
            return -1;
        };
        if root.score >= item.score || item.score.is_nan() {
            return 0;
        }
        *root = item;
        let below = |a: &ArcHeadHeapItem, b: &ArcHeadHeapItem| a.score < b.score;
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            if left >= k {
                break;
            }
            let right = left + 1;
            let child = if below(&self.slots[left], &self.slots[i]) {
                if right < k && below(&self.slots[right], &self.slots[left]) {
                    right
                } else {
                    left
                }
            } else if right < k && below(&self.slots[right], &self.slots[i]) {
                right
            } else {
                break;
            };
            self.slots.swap(i, child);
            i = child;
        }
        1
    }

    /// Occupied slots in heap order.
    pub fn slots(&self) -> impl Iterator<Item = &ArcHeadHeapItem> {
        self.slots.iter().filter(|s| s.vertex.is_some())
    }

    /// Retained entries, best score first.
    pub fn ranked(&self) -> Vec<ArcHeadHeapItem> {
        let mut out: Vec<ArcHeadHeapItem> = self.slots().copied().collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        out
    }
}
