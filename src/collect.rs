//! Result collector staging.
//!
//! The evaluator does not own result sets. It holds a `&mut dyn Collector`
//! supplied by the caller and drives it through a small protocol:
//!
//! - **stage(cx)**: record the current arc provisionally in slot `cx`
//!   (`cx & 3`), replacing whatever was staged there before
//! - **unstage(cx)**: discard the staged item
//! - **commit(cx)**: move the staged item into the permanent results
//! - **collect**: stage and commit in one step, bypassing the slots
//!
//! Every verb reports `1` on success, `0` when there was nothing to do and
//! `-1` on failure. Failures never raise; the evaluator folds them into
//! the stack.
//!
//! # Predicator override
//!
//! Staging and collecting may replace the arc value with a computed one.
//! The override retypes the predicator by the value's item type, see
//! [`override_predicator`].

use crate::core::{Predicator, StackItem, VertexRef};

/// Number of staging slots, addressed as `cx & (STAGE_SLOTS - 1)`.
pub const STAGE_SLOTS: usize = 4;

/// What a collector accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    Arc,
    Vertex,
}

/// The arc under evaluation, as handed to a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcRef {
    pub tail: VertexRef,
    pub head: VertexRef,
    pub predicator: Predicator,
}

/// Retype a predicator around a computed arc value.
///
/// `INTEGER` stores a signed 32-bit value, `REAL` a float, `BITVECTOR` the
/// low 32 bits unsigned; anything else clears the modifier and value.
/// `NONE` means no override.
pub fn override_predicator(arcvalue: &StackItem, pred: Predicator) -> Option<Predicator> {
    let (modifier, value) = match *arcvalue {
        StackItem::None => return None,
        StackItem::Integer(i) => (Predicator::MOD_INTEGER, i as i32 as u32),
        StackItem::Real(r) => (Predicator::MOD_FLOAT, (r as f32).to_bits()),
        StackItem::Bitvector(b) => (Predicator::MOD_UNSIGNED, b as u32),
        _ => (Predicator::MOD_NONE, 0),
    };
    Some(Predicator::new(pred.rel(), pred.dir(), modifier, value))
}

/// Result accumulator driven by the staging operators.
pub trait Collector: Send {
    fn kind(&self) -> CollectorKind;

    /// Stage an arc into slot `cx`, optionally with an overriding predicator.
    fn stage_arc(&mut self, arc: &ArcRef, cx: usize, predicator: Option<Predicator>) -> i64;

    /// Stage the head vertex of an arc into slot `cx`.
    fn stage_vertex(&mut self, arc: &ArcRef, cx: usize) -> i64;

    fn unstage(&mut self, cx: usize) -> i64;

    fn commit(&mut self, cx: usize) -> i64;

    /// Collect an arc directly, with its predicator already overridden.
    fn collect_arc(&mut self, arc: &ArcRef) -> i64;

    fn collect_vertex(&mut self, arc: &ArcRef) -> i64;

    /// Raw sort value of the weakest retained result of a sorted
    /// collector, `0` when unsorted or not yet full.
    fn sort_floor(&self) -> u64 {
        0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// In-crate Collector
// ═══════════════════════════════════════════════════════════════════════════

/// One collected or staged result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedItem {
    pub tail: VertexRef,
    pub head: VertexRef,
    pub predicator: Predicator,
    /// Sort key, the predicator value as a double.
    pub score: f64,
}

impl CollectedItem {
    fn from_arc(arc: &ArcRef, predicator: Predicator) -> Self {
        Self { tail: arc.tail, head: arc.head, predicator, score: predicator.value_real() }
    }
}

/// A bounded result set with four staging slots.
///
/// Unsorted collectors keep results in arrival order until `capacity` is
/// reached. Sorted collectors keep the `capacity` highest scores, evicting
/// the weakest when a better result arrives.
#[derive(Debug, Clone)]
pub struct ResultCollector {
    kind: CollectorKind,
    capacity: usize,
    sorted: bool,
    read_only: bool,
    stage: [Option<CollectedItem>; STAGE_SLOTS],
    results: Vec<CollectedItem>,
}

impl ResultCollector {
    pub fn new(kind: CollectorKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            sorted: false,
            read_only: false,
            stage: [None; STAGE_SLOTS],
            results: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Keep the `capacity` best-scoring results.
    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    /// Reject every mutation with a diagnostic.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn staged(&self, cx: usize) -> Option<&CollectedItem> {
        self.stage[cx & (STAGE_SLOTS - 1)].as_ref()
    }

    /// Committed results. Sorted collectors list them best first.
    pub fn results(&self) -> Vec<CollectedItem> {
        let mut out = self.results.clone();
        if self.sorted {
            out.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        out
    }

    /// Drop staged and committed results.
    pub fn clear(&mut self) {
        self.stage = [None; STAGE_SLOTS];
        self.results.clear();
    }

    fn refuse(&self, verb: &str) -> bool {
        if self.read_only {
            tracing::warn!(verb, "collector is read-only, operation ignored");
        }
        self.read_only
    }

    fn put_stage(&mut self, cx: usize, item: CollectedItem) -> i64 {
        if self.refuse("stage") {
            return 0;
        }
        self.stage[cx & (STAGE_SLOTS - 1)] = Some(item);
        1
    }

    /// Weakest retained result position of a full sorted collector.
    fn weakest(&self) -> Option<usize> {
        self.results
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
            .map(|(i, _)| i)
    }

    fn admit(&mut self, item: CollectedItem) -> i64 {
        if self.results.len() < self.capacity {
            self.results.push(item);
            return 1;
        }
        if !self.sorted {
            return 0;
        }
        match self.weakest() {
            Some(i) if self.results[i].score < item.score => {
                self.results[i] = item;
                1
            }
            _ => 0,
        }
    }
}

impl Collector for ResultCollector {
    fn kind(&self) -> CollectorKind {
        self.kind
    }

    fn stage_arc(&mut self, arc: &ArcRef, cx: usize, predicator: Option<Predicator>) -> i64 {
        let item = CollectedItem::from_arc(arc, predicator.unwrap_or(arc.predicator));
        self.put_stage(cx, item)
    }

    fn stage_vertex(&mut self, arc: &ArcRef, cx: usize) -> i64 {
        let item = CollectedItem::from_arc(arc, arc.predicator);
        self.put_stage(cx, item)
    }

    fn unstage(&mut self, cx: usize) -> i64 {
        if self.refuse("unstage") {
            return 0;
        }
        self.stage[cx & (STAGE_SLOTS - 1)].take().map_or(0, |_| 1)
    }

    fn commit(&mut self, cx: usize) -> i64 {
        if self.refuse("commit") {
            return 0;
        }
        match self.stage[cx & (STAGE_SLOTS - 1)].take() {
            Some(item) => self.admit(item),
            None => 0,
        }
    }

    fn collect_arc(&mut self, arc: &ArcRef) -> i64 {
        if self.refuse("collect") {
            return 0;
        }
        self.admit(CollectedItem::from_arc(arc, arc.predicator))
    }

    fn collect_vertex(&mut self, arc: &ArcRef) -> i64 {
        self.collect_arc(arc)
    }

    fn sort_floor(&self) -> u64 {
        if !self.sorted || self.results.len() < self.capacity {
            return 0;
        }
        self.weakest().map_or(0, |i| self.results[i].score.to_bits())
    }
}
