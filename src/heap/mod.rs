//! Heaps over memory bank slices.
//!
//! # Polarity
//!
//! A *min* heap keeps its smallest item at the root and therefore retains
//! the largest items pushed through it; a *max* heap is the mirror image.
//! `NONE` is the extremal sentinel for each polarity: the minimum in a
//! min heap and the maximum in a max heap, so freshly initialized slots
//! are displaced first and never outrank a real value.
//!
//! Every routine takes a "down comparator" `down(a, b)` meaning *a should
//! sit above b*. Item ordering itself is injected so the heap stays
//! independent of string and vector comparison rules.
//!
//! - [`cull`]: the fixed-capacity score heap used for top-k shortlisting

pub mod cull;

use std::cmp::Ordering;

use crate::core::StackItem;

pub use cull::{ArcHeadHeapItem, CullHeap};

/// Heap polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Min,
    Max,
}

impl Polarity {
    /// `a` belongs above `b`. `order` is the item ordering for non-`NONE`
    /// pairs; unordered pairs never move.
    pub fn above<F>(self, a: &StackItem, b: &StackItem, order: &F) -> bool
    where
        F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
    {
        match self {
            Polarity::Min => {
                if a.is_none() {
                    return !b.is_none();
                }
                if b.is_none() {
                    return false;
                }
                order(a, b) == Some(Ordering::Less)
            }
            Polarity::Max => {
                if a.is_none() {
                    return !b.is_none();
                }
                if b.is_none() {
                    return false;
                }
                order(a, b) == Some(Ordering::Greater)
            }
        }
    }
}

/// Reset every slot to `NONE`.
pub fn init(heap: &mut [StackItem]) {
    heap.fill(StackItem::None);
}

/// Sift the item at `i` towards the root.
pub fn sift_up<F>(heap: &mut [StackItem], mut i: usize, polarity: Polarity, order: &F)
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    while i > 0 {
        let parent = (i - 1) >> 1;
        if polarity.above(&heap[i], &heap[parent], order) {
            heap.swap(i, parent);
            i = parent;
        } else {
            return;
        }
    }
}

/// Sift the item at `i` towards the leaves.
pub fn sift_down<F>(heap: &mut [StackItem], mut i: usize, polarity: Polarity, order: &F)
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    let k = heap.len();
    loop {
        let left = 2 * i + 1;
        if left >= k {
            return;
        }
        let right = left + 1;
        let child = if polarity.above(&heap[left], &heap[i], order) {
            if right < k && polarity.above(&heap[right], &heap[left], order) {
                right
            } else {
                left
            }
        } else if right < k && polarity.above(&heap[right], &heap[i], order) {
            right
        } else {
            return;
        };
        heap.swap(i, child);
        i = child;
    }
}

/// Replace the root with `item` if the root belongs above it, then
/// restore the heap. Returns whether the item was admitted.
pub fn try_replace<F>(heap: &mut [StackItem], item: StackItem, polarity: Polarity, order: &F) -> bool
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    match heap.first_mut() {
        Some(root) if polarity.above(root, &item, order) => {
            *root = item;
            sift_down(heap, 0, polarity, order);
            true
        }
        _ => false,
    }
}

/// Bottom-up heap construction in O(k).
pub fn heapify<F>(heap: &mut [StackItem], polarity: Polarity, order: &F)
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    for i in (0..heap.len() / 2).rev() {
        sift_down(heap, i, polarity, order);
    }
}

/// Heapify `heap` and stream every item of `source` through it.
pub fn sift<F>(heap: &mut [StackItem], source: &[StackItem], polarity: Polarity, order: &F) -> usize
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    heapify(heap, polarity, order);
    for item in source {
        try_replace(heap, *item, polarity, order);
    }
    source.len()
}

/// Heap invariant check: every parent belongs above (or level with) its children.
pub fn is_heap<F>(heap: &[StackItem], polarity: Polarity, order: &F) -> bool
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    (1..heap.len()).all(|i| !polarity.above(&heap[i], &heap[(i - 1) >> 1], order))
}

// ═══════════════════════════════════════════════════════════════════════════
// Sorting
// ═══════════════════════════════════════════════════════════════════════════

/// In-place heapsort with `NONE` sorted to the tail in both directions.
///
/// Returns the number of leading non-`NONE` items. The comparator is
/// allowed to be inconsistent (mixed types, NaN); the sort still
/// terminates with every item retained.
pub fn sort<F>(slice: &mut [StackItem], ascending: bool, order: &F) -> usize
where
    F: Fn(&StackItem, &StackItem) -> Option<Ordering>,
{
    let tail = if ascending { Ordering::Greater } else { Ordering::Less };
    let place = |a: &StackItem, b: &StackItem| -> bool {
        match (a.is_none(), b.is_none()) {
            (true, false) => true,
            (_, true) => false,
            _ => order(a, b) == Some(tail),
        }
    };
    heapsort_by(slice, &place);
    slice.partition_point(|x| !x.is_none())
}

/// Ascending or descending sort by raw `f64` payload.
pub fn sort_raw_real(slice: &mut [StackItem], ascending: bool) -> usize {
    let place = |a: &StackItem, b: &StackItem| {
        let (x, y) = (a.raw_real(), b.raw_real());
        if ascending {
            x > y
        } else {
            x < y
        }
    };
    heapsort_by(slice, &place);
    slice.partition_point(|x| !x.is_none())
}

/// Heapsort where `above(a, b)` means `a` belongs nearer the end.
fn heapsort_by<F>(slice: &mut [StackItem], above: &F)
where
    F: Fn(&StackItem, &StackItem) -> bool,
{
    fn down<F: Fn(&StackItem, &StackItem) -> bool>(s: &mut [StackItem], mut i: usize, n: usize, above: &F) {
        loop {
            let left = 2 * i + 1;
            if left >= n {
                return;
            }
            let mut top = i;
            if above(&s[left], &s[top]) {
                top = left;
            }
            if left + 1 < n && above(&s[left + 1], &s[top]) {
                top = left + 1;
            }
            if top == i {
                return;
            }
            s.swap(i, top);
            i = top;
        }
    }
    let n = slice.len();
    for i in (0..n / 2).rev() {
        down(slice, i, n, above);
    }
    for end in (1..n).rev() {
        slice.swap(0, end);
        down(slice, 0, end, above);
    }
}
