//! Traversal context, decay, arc groups and result collection.
//!
//! Vertex and arc loads read the triple and predicators carried by the
//! [`EvalContext`]; anything the context does not hold is resolved through
//! its [`GraphView`](crate::core::GraphView). A missing vertex or graph
//! degrades to `NONE`.
//!
//! # Arc Groups
//!
//! The group operators (`synarc.*`) see a multi-arc as a run of raw exit
//! arcs closed by a synthetic one. Raw arcs fold into the work register of
//! the call site and push `NONE`; the synthetic arc reads the register
//! out, pushes the result and clears the register for the next group.

use tracing::trace;

use crate::collect::{override_predicator, ArcRef, CollectorKind};
use crate::context::{EvalContext, Role};
use crate::core::{hash_bytes, EvalObject, Predicator, PropertyValue, StackItem, VectorObject};
use crate::decay::{self, ArcAggregate, DecayKind};

use super::evaluator::{Evaluator, GroupFilter, SlotVerb, WorkRegister};
use super::opcode::{ArcField, Constant, VertexField};

/// Staging verbs take at most this many arguments besides the condition.
const MAX_STAGE_ARGS: usize = 2;

impl Evaluator {
    // ═══════════════════════════════════════════════════════════════════
    // Vertex and Arc Loads
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn vertex_field(&mut self, role: Role, field: VertexField, ctx: &EvalContext<'_>) {
        let Some(v) = ctx.vertex(role) else {
            self.stack.push(StackItem::None);
            return;
        };
        let item = match (field, ctx.graph) {
            (VertexField::Ref, _) => StackItem::Vertex(v),
            (VertexField::Id, _) => StackItem::VertexId(v),
            (_, None) => StackItem::None,
            (VertexField::InternalId, Some(g)) => {
                let id = g.internal_id(v);
                StackItem::Bitvector((id >> 64) as u64 ^ id as u64)
            }
            (VertexField::Type, Some(g)) => StackItem::Integer(g.vertex_type(v) as i64),
            (VertexField::Degree, Some(g)) => StackItem::Integer(g.degree(v)),
            (VertexField::InDegree, Some(g)) => StackItem::Integer(g.indegree(v)),
            (VertexField::OutDegree, Some(g)) => StackItem::Integer(g.outdegree(v)),
            (VertexField::Created, Some(g)) => StackItem::Integer(g.timestamps(v).created),
            (VertexField::Modified, Some(g)) => StackItem::Integer(g.timestamps(v).modified),
            (VertexField::Expires, Some(g)) => StackItem::Integer(g.timestamps(v).expires),
            (VertexField::C1, Some(g)) => StackItem::Real(g.rank(v).c1 as f64),
            (VertexField::C0, Some(g)) => StackItem::Real(g.rank(v).c0 as f64),
            (VertexField::Virtual, Some(g)) => StackItem::boolean(g.is_virtual(v)),
            (VertexField::PropertyCount, Some(g)) => StackItem::Integer(g.property_count(v)),
            (VertexField::Vector, Some(g)) => {
                // Vertices without a vector read as the null vector.
                let vector = g.vector(v).cloned().unwrap_or_else(|| VectorObject::from_f32(&[]));
                let mut env = op_env!(self, ctx);
                env.scope_vector(vector)
            }
        };
        self.stack.push(item);
    }

    /// One attribute of an arc predicator.
    pub(super) fn arc_field(pred: Predicator, field: ArcField) -> StackItem {
        match field {
            ArcField::Value => pred.value(),
            ArcField::Distance => StackItem::Integer(pred.distance()),
            ArcField::RelCode => StackItem::Integer(pred.rel() as i64),
            ArcField::Direction => StackItem::Integer(pred.dir() as i64),
            ArcField::Modifier => StackItem::Integer(pred.stored_modifier() as i64),
            ArcField::IsFwdOnly => StackItem::boolean(pred.is_forward_only()),
            ArcField::IsSyn => StackItem::boolean(pred.is_synthetic()),
            ArcField::Raw => StackItem::Integer(pred.bits() as i64),
        }
    }

    /// `( key [dflt [cond]] -- value )`
    ///
    /// Keys are property hashes or property names. A missing property
    /// yields the default argument, or the context default without one. A
    /// false condition skips the lookup.
    pub(super) fn property(&mut self, role: Role, nargs: usize, ctx: &mut EvalContext<'_>) {
        if !(1..=3).contains(&nargs) {
            self.stack.discard(nargs);
            self.stack.push(ctx.default_property);
            return;
        }
        let cond = if nargs == 3 { self.stack.pop().condition() } else { true };
        let dflt = if nargs >= 2 { self.stack.pop() } else { ctx.default_property };
        if !cond {
            self.set_top(dflt);
            return;
        }
        let key = match self.stack.top() {
            StackItem::CString(r) => self.objects.str(r).map_or(0, |(name, _)| hash_bytes(name) as i64),
            other => other.raw_integer(),
        };
        let found = ctx.vertex(role).and_then(|v| ctx.property(v, key));
        let item = match found {
            Some(PropertyValue::Integer(i)) => StackItem::Integer(i),
            Some(PropertyValue::Real(r)) => StackItem::Real(r),
            Some(PropertyValue::Text(s)) => {
                let mut env = op_env!(self, ctx);
                env.scope_str(EvalObject::string(&s))
            }
            None => dflt,
        };
        self.set_top(item);
    }

    /// `( a1 .. an -- real )`: `c1 * sum + c0` over the numeric arguments.
    pub(super) fn rank(&mut self, nargs: usize, ctx: &EvalContext<'_>) {
        let sum: f64 = self
            .stack
            .pop_n(nargs)
            .iter()
            .map(|x| match *x {
                StackItem::Integer(i) => i as f64,
                StackItem::Real(r) => r,
                _ => 0.0,
            })
            .sum();
        let rank = ctx.rank();
        self.stack.push(StackItem::Real(rank.c1 as f64 * sum + rank.c0 as f64));
    }

    pub(super) fn constant(&mut self, c: Constant, ctx: &EvalContext<'_>) {
        let item = match c {
            Constant::T0 => StackItem::Real(ctx.t0),
            Constant::TNow => StackItem::Real(ctx.tnow),
            Constant::Age => StackItem::Real(ctx.tnow - ctx.t0),
            Constant::Order => StackItem::Integer(ctx.graph.map_or(0, |g| g.order())),
            Constant::Size => StackItem::Integer(ctx.graph.map_or(0, |g| g.size())),
            Constant::OpCount => StackItem::Integer(self.op_count as i64),
            Constant::RankScore => StackItem::Real(ctx.rankscore),
        };
        self.stack.push(item);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Encodings
    // ═══════════════════════════════════════════════════════════════════

    /// `( name -- code )`: integers pass through, unknown names encode to
    /// -1 so they never match a wildcard, anything else encodes to 0.
    pub(super) fn relenc(&mut self, ctx: &mut EvalContext<'_>) {
        let code = match self.stack.top() {
            StackItem::Integer(_) => return,
            StackItem::CString(r) => self
                .objects
                .str(r)
                .and_then(|(name, _)| ctx.relationship_code(name))
                .map_or(-1, |code| code as i64),
            _ => Predicator::REL_NONE as i64,
        };
        self.set_top(StackItem::Integer(code));
    }

    /// `( code -- name )`: unknown codes are left as they are.
    pub(super) fn reldec(&mut self, ctx: &EvalContext<'_>) {
        if let StackItem::Integer(code) = self.stack.top() {
            let name = ctx.graph.and_then(|g| g.decode_relationship(code as u16));
            if let Some(name) = name {
                let mut env = op_env!(self, ctx);
                let item = env.scope_str(EvalObject::string(name));
                self.set_top(item);
            }
        }
    }

    pub(super) fn typeenc(&mut self, ctx: &mut EvalContext<'_>) {
        let code = match self.stack.top() {
            StackItem::Integer(_) => return,
            StackItem::CString(r) => self
                .objects
                .str(r)
                .and_then(|(name, _)| ctx.vertex_type_code(name))
                .map_or(-1, |code| code as i64),
            _ => 0,
        };
        self.set_top(StackItem::Integer(code));
    }

    pub(super) fn typedec(&mut self, ctx: &EvalContext<'_>) {
        if let StackItem::Integer(code) = self.stack.top() {
            let name = ctx.graph.and_then(|g| g.decode_vertex_type(code as u8));
            if let Some(name) = name {
                let mut env = op_env!(self, ctx);
                let item = env.scope_str(EvalObject::string(name));
                self.set_top(item);
            }
        }
    }

    /// `( lo hi -- int )`: uniform in `[lo, hi)`, `lo` when the range is empty.
    pub(super) fn randint(&mut self) {
        let hi = self.stack.pop();
        let lo = self.stack.top();
        let bound = |x: StackItem| match x {
            StackItem::Integer(i) => Some(i),
            StackItem::Real(r) => Some(r as i64),
            _ => None,
        };
        let (l, h) = match (bound(lo), bound(hi)) {
            (Some(l), Some(h)) => (l, h),
            _ => (0, 1),
        };
        let r = if h > l { l + self.rand63() % h.wrapping_sub(l) } else { l };
        self.set_top(StackItem::Integer(r));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Decay
    // ═══════════════════════════════════════════════════════════════════

    /// `( n0 t rate -- real )`
    pub(super) fn decay_formula(&mut self, exponential: bool) {
        let rate = self.stack.pop().get_real();
        let t = self.stack.pop().get_real();
        let n0 = self.stack.top().get_real();
        let nt = if exponential { decay::exp_decay(n0, t, rate) } else { decay::lin_decay(n0, t, rate) };
        self.set_top(StackItem::Real(nt));
    }

    /// `( relenc [rate] -- real|NONE )` over the arc group of the exit arc.
    ///
    /// On the synthetic arc that closes a group, the decayed arc's
    /// relationship is written into `ctx.exit`.
    pub(super) fn arc_decay(&mut self, kind: DecayKind, pc: usize, nargs: usize, ctx: &mut EvalContext<'_>) {
        let rate = match nargs {
            2 => Some(self.stack.pop()),
            1 => None,
            _ => {
                self.stack.discard(nargs);
                self.stack.push(StackItem::None);
                return;
            }
        };
        let relenc = self.stack.pop().raw_integer();
        let pred = ctx.exit;
        let register = &mut self.registers[pc];
        let mut aggregate = match *register {
            WorkRegister::Aggregate(a) => a,
            _ => ArcAggregate::default(),
        };
        let item = if pred.is_synthetic() {
            *register = WorkRegister::Empty;
            let rate = rate.map_or(0.0, |r| match r {
                StackItem::Real(v) => v,
                other => other.raw_integer() as f64,
            });
            match aggregate.finish(rate) {
                Some(d) => {
                    trace!(rel = d.rel, n0 = d.n0, t0 = d.t0, tx = d.tx, "arc group decayed");
                    ctx.exit = pred.with_rel(d.rel);
                    StackItem::Real(d.value(kind, ctx.tnow, ctx.t0))
                }
                None => StackItem::None,
            }
        } else {
            aggregate.fold(pred, relenc);
            *register = WorkRegister::Aggregate(aggregate);
            StackItem::None
        };
        self.stack.push(item);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Arc Group Filters
    // ═══════════════════════════════════════════════════════════════════

    /// Bitvector of filter arguments matched anywhere in the arc group.
    /// The rightmost argument is bit 0.
    pub(super) fn group_bits(&mut self, pc: usize, nargs: usize, ctx: &EvalContext<'_>, filter: GroupFilter) {
        let args = self.stack.pop_n(nargs);
        let pred = ctx.exit;
        let register = &mut self.registers[pc];
        let bits = match *register {
            WorkRegister::Bits(b) => b,
            _ => 0,
        };
        let item = if pred.is_synthetic() {
            *register = WorkRegister::Empty;
            StackItem::Bitvector(bits)
        } else {
            let matched = match filter {
                GroupFilter::Rel => decay::hasrel_bits(pred, &args),
                GroupFilter::Mod => decay::hasmod_bits(pred, &args),
                GroupFilter::RelMod => decay::hasrelmod_bits(pred, &args),
            };
            *register = WorkRegister::Bits(bits | matched);
            StackItem::None
        };
        self.stack.push(item);
    }

    /// `( rel mod -- value|NONE )`: value of the last raw arc of the group
    /// matching the filter. 0 is a wildcard on either side.
    pub(super) fn group_value(&mut self, pc: usize, ctx: &EvalContext<'_>) {
        let modifier = self.stack.pop();
        let rel = self.stack.top();
        let pred = ctx.exit;
        let register = &mut self.registers[pc];
        let item = if pred.is_synthetic() {
            let found = match *register {
                WorkRegister::Item(item) => item,
                _ => StackItem::None,
            };
            *register = WorkRegister::Empty;
            found
        } else {
            if decay::relmod_match(pred, &rel, &modifier) {
                *register = WorkRegister::Item(pred.value());
            }
            StackItem::None
        };
        self.set_top(item);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Collector
    // ═══════════════════════════════════════════════════════════════════

    /// `( [arcvalue [cx]] -- 1|0|-1 )` or `( c [arcvalue [cx]] -- c )`.
    /// A failed conditional stage clears the condition.
    pub(super) fn stage(&mut self, nargs: usize, ctx: &mut EvalContext<'_>, cond: bool) {
        let arity = if cond { nargs.saturating_sub(1) } else { nargs };
        if arity > MAX_STAGE_ARGS {
            self.reject(arity, cond);
            return;
        }
        let cx = if arity == 2 { self.stack.pop().raw_integer() as usize } else { 0 };
        let arcvalue = if arity >= 1 { Some(self.stack.pop()) } else { None };
        if cond {
            if self.stack.top().condition() && stage_current(ctx, cx, arcvalue) < 0 {
                self.set_top(StackItem::ZERO);
            }
        } else {
            let r = stage_current(ctx, cx, arcvalue);
            self.stack.push(StackItem::Integer(r));
        }
    }

    /// `( [cx] -- 1|0|-1 )` or `( c [cx] -- c )`
    pub(super) fn slot_verb(&mut self, nargs: usize, ctx: &mut EvalContext<'_>, verb: SlotVerb, cond: bool) {
        let arity = if cond { nargs.saturating_sub(1) } else { nargs };
        if arity > 1 {
            self.reject(arity, cond);
            return;
        }
        let cx = if arity == 1 { self.stack.pop().raw_integer() as usize } else { 0 };
        if cond {
            if self.stack.top().condition() && slot_current(ctx, cx, verb) < 0 {
                self.set_top(StackItem::ZERO);
            }
        } else {
            let r = slot_current(ctx, cx, verb);
            self.stack.push(StackItem::Integer(r));
        }
    }

    /// `( [arcvalue] -- 1|0|-1 )` or `( c [arcvalue] -- c )`. A `NONE`
    /// arc value collects nothing.
    pub(super) fn collect(&mut self, nargs: usize, ctx: &mut EvalContext<'_>, cond: bool) {
        let arity = if cond { nargs.saturating_sub(1) } else { nargs };
        if arity > 1 {
            self.reject(arity, cond);
            return;
        }
        let arcvalue = if arity == 1 { Some(self.stack.pop()) } else { None };
        if cond {
            if self.stack.top().condition() && collect_current(ctx, arcvalue) < 0 {
                self.set_top(StackItem::ZERO);
            }
        } else {
            let r = collect_current(ctx, arcvalue);
            self.stack.push(StackItem::Integer(r));
        }
    }

    /// Raw sort value of the weakest result a sorted collector retains.
    pub(super) fn sort_floor(ctx: &EvalContext<'_>) -> u64 {
        ctx.collector.as_deref().map_or(0, |c| c.sort_floor())
    }

    /// Too many arguments: drop them and report failure.
    fn reject(&mut self, arity: usize, cond: bool) {
        self.stack.discard(arity);
        if cond {
            self.set_top(StackItem::ZERO);
        } else {
            self.stack.push(StackItem::Integer(-1));
        }
    }
}

fn stage_current(ctx: &mut EvalContext<'_>, cx: usize, arcvalue: Option<StackItem>) -> i64 {
    let Some(arc) = ctx.arc() else {
        return -1;
    };
    let Some(collector) = ctx.collector.as_deref_mut() else {
        return 0;
    };
    match collector.kind() {
        CollectorKind::Arc => {
            let predicator = arcvalue.and_then(|v| override_predicator(&v, arc.predicator));
            collector.stage_arc(&arc, cx, predicator)
        }
        CollectorKind::Vertex => collector.stage_vertex(&arc, cx),
    }
}

fn slot_current(ctx: &mut EvalContext<'_>, cx: usize, verb: SlotVerb) -> i64 {
    match (ctx.collector.as_deref_mut(), verb) {
        (Some(c), SlotVerb::Unstage) => c.unstage(cx),
        (Some(c), SlotVerb::Commit) => c.commit(cx),
        (None, _) => 0,
    }
}

fn collect_current(ctx: &mut EvalContext<'_>, arcvalue: Option<StackItem>) -> i64 {
    if arcvalue.is_some_and(|v| v.is_none()) {
        return 0;
    }
    let Some(arc) = ctx.arc() else {
        return -1;
    };
    let Some(collector) = ctx.collector.as_deref_mut() else {
        return 0;
    };
    match collector.kind() {
        CollectorKind::Arc => {
            let predicator = arcvalue.and_then(|v| override_predicator(&v, arc.predicator));
            let arc = ArcRef { predicator: predicator.unwrap_or(arc.predicator), ..arc };
            collector.collect_arc(&arc)
        }
        CollectorKind::Vertex => collector.collect_vertex(&arc),
    }
}
