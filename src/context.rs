//! Per-invocation evaluation context.
//!
//! The caller builds an [`EvalContext`] for each visited arc or vertex and
//! hands it to [`Evaluator::evaluate`](crate::vm::Evaluator::evaluate). The
//! context carries everything the program may read about the traversal:
//!
//! - the traversal triple (tail, this, head) as weak vertex handles
//! - the arrival and exit arc predicators
//! - the graph, the result collector and the timing budget
//! - rank coefficients and the wall-clock anchors `t0` and `tnow`
//!
//! It also keeps small last-seen caches for relationship and vertex type
//! encodings and for property lookups, so a program that asks for the same
//! name on every arc only pays for the lookup once.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::collect::{ArcRef, Collector};
use crate::core::{hash_bytes, GraphView, Predicator, PropertyValue, Rank, StackItem, VertexRef};

// ═══════════════════════════════════════════════════════════════════════════
// Timing Budget
// ═══════════════════════════════════════════════════════════════════════════

/// Cooperative cancellation flag shared between a search and its evaluators.
///
/// `halt` ops set it, `continue` ops clear it, and the control loop polls
/// it between operations. Deadlines are the caller's business.
#[derive(Debug, Default)]
pub struct TimingBudget {
    halted: AtomicBool,
}

impl TimingBudget {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    #[inline]
    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Vertex Roles
// ═══════════════════════════════════════════════════════════════════════════

/// Position of a vertex in the traversal triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Vertex the arc was followed from.
    Tail,
    /// Vertex being evaluated.
    This,
    /// Vertex reached through the exit arc.
    Head,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Tail => "prev",
            Role::This => "vertex",
            Role::Head => "next",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lookup Caches
// ═══════════════════════════════════════════════════════════════════════════

/// Single-entry cache keyed by a 64-bit hash.
#[derive(Debug, Clone, Default)]
struct LastSeen<V> {
    entry: Option<(u64, V)>,
}

impl<V: Clone> LastSeen<V> {
    fn get_or_insert_with(&mut self, key: u64, f: impl FnOnce() -> V) -> V {
        match &self.entry {
            Some((k, v)) if *k == key => v.clone(),
            _ => {
                let v = f();
                self.entry = Some((key, v.clone()));
                v
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Caches {
    relationship: LastSeen<Option<u16>>,
    vertex_type: LastSeen<Option<u8>>,
    property: Option<(VertexRef, i64, Option<PropertyValue>)>,
    hits: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Evaluation Context
// ═══════════════════════════════════════════════════════════════════════════

/// Everything one evaluation may read about the traversal.
pub struct EvalContext<'a> {
    pub graph: Option<&'a dyn GraphView>,
    pub tail: Option<VertexRef>,
    pub this: Option<VertexRef>,
    pub head: Option<VertexRef>,
    pub arrive: Predicator,
    pub exit: Predicator,
    pub collector: Option<&'a mut dyn Collector>,
    /// Rank coefficients; `None` reads them from the graph for `this`.
    pub rank: Option<Rank>,
    /// Score already computed for the candidate by the search.
    pub rankscore: f64,
    /// Traversal inception time in seconds.
    pub t0: f64,
    /// Current time in seconds.
    pub tnow: f64,
    pub budget: Option<&'a TimingBudget>,
    /// Value pushed by property lookups that find nothing.
    pub default_property: StackItem,
    caches: Caches,
}

impl<'a> EvalContext<'a> {
    pub fn new(graph: Option<&'a dyn GraphView>) -> Self {
        Self {
            graph,
            tail: None,
            this: None,
            head: None,
            arrive: Predicator::NONE,
            exit: Predicator::NONE,
            collector: None,
            rank: None,
            rankscore: 0.0,
            t0: 0.0,
            tnow: 0.0,
            budget: None,
            default_property: StackItem::None,
            caches: Caches::default(),
        }
    }

    /// Context without a graph, for programs that only compute.
    pub fn detached() -> Self {
        Self::new(None)
    }

    pub fn with_vertices(mut self, tail: Option<VertexRef>, this: Option<VertexRef>, head: Option<VertexRef>) -> Self {
        self.tail = tail;
        self.this = this;
        self.head = head;
        self
    }

    pub fn with_arcs(mut self, arrive: Predicator, exit: Predicator) -> Self {
        self.arrive = arrive;
        self.exit = exit;
        self
    }

    pub fn with_collector(mut self, collector: &'a mut dyn Collector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_rank(mut self, rank: Rank) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_rankscore(mut self, score: f64) -> Self {
        self.rankscore = score;
        self
    }

    pub fn with_time(mut self, t0: f64, tnow: f64) -> Self {
        self.t0 = t0;
        self.tnow = tnow;
        self
    }

    pub fn with_budget(mut self, budget: &'a TimingBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_default_property(mut self, value: StackItem) -> Self {
        self.default_property = value;
        self
    }

    /// Move to the next arc of the same traversal, keeping the caches.
    pub fn advance(&mut self, tail: Option<VertexRef>, this: Option<VertexRef>, arrive: Predicator) {
        self.tail = tail;
        self.this = this;
        self.arrive = arrive;
    }

    #[inline]
    pub fn vertex(&self, role: Role) -> Option<VertexRef> {
        match role {
            Role::Tail => self.tail,
            Role::This => self.this,
            Role::Head => self.head,
        }
    }

    /// The arc that led to `this`.
    pub fn arc(&self) -> Option<ArcRef> {
        Some(ArcRef { tail: self.tail?, head: self.this?, predicator: self.arrive })
    }

    /// Rank coefficients for the vertex under evaluation.
    pub fn rank(&self) -> Rank {
        match (self.rank, self.graph, self.this) {
            (Some(rank), _, _) => rank,
            (None, Some(g), Some(v)) => g.rank(v),
            _ => Rank::default(),
        }
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.budget.is_some_and(TimingBudget::is_halted)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Cached Lookups
    // ═══════════════════════════════════════════════════════════════════

    /// Relationship code for a name, `None` when unknown.
    pub fn relationship_code(&mut self, name: &[u8]) -> Option<u16> {
        let graph = self.graph?;
        let key = hash_bytes(name);
        let before = self.caches.relationship.entry.as_ref().map(|(k, _)| *k);
        let code = self
            .caches
            .relationship
            .get_or_insert_with(key, || std::str::from_utf8(name).ok().and_then(|n| graph.encode_relationship(n)));
        if before == Some(key) {
            self.caches.hits += 1;
        }
        code
    }

    /// Vertex type code for a name, `None` when unknown.
    pub fn vertex_type_code(&mut self, name: &[u8]) -> Option<u8> {
        let graph = self.graph?;
        let key = hash_bytes(name);
        let before = self.caches.vertex_type.entry.as_ref().map(|(k, _)| *k);
        let code = self
            .caches
            .vertex_type
            .get_or_insert_with(key, || std::str::from_utf8(name).ok().and_then(|n| graph.encode_vertex_type(n)));
        if before == Some(key) {
            self.caches.hits += 1;
        }
        code
    }

    /// Property of `v` stored under `key`, remembering the last lookup.
    pub fn property(&mut self, v: VertexRef, key: i64) -> Option<PropertyValue> {
        if let Some((cv, ck, value)) = &self.caches.property {
            if *cv == v && *ck == key {
                self.caches.hits += 1;
                return value.clone();
            }
        }
        let value = self.graph?.property(v, key);
        self.caches.property = Some((v, key, value.clone()));
        value
    }

    /// Number of lookups answered from the caches.
    pub fn cache_hits(&self) -> u64 {
        self.caches.hits
    }
}

impl std::fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("tail", &self.tail)
            .field("this", &self.this)
            .field("head", &self.head)
            .field("arrive", &self.arrive)
            .field("exit", &self.exit)
            .field("collector", &self.collector.is_some())
            .field("t0", &self.t0)
            .field("tnow", &self.tnow)
            .finish()
    }
}
