//! Scalar bank access, the bank stack, counters and membership sets.
//!
//! Addresses are masked into the bank, so every index is valid. Indirect
//! variants read the effective address from the addressed cell first.

use tracing::warn;

use crate::context::EvalContext;
use crate::core::dwset::{integer_key, vertex_key};
use crate::core::{admit, KeyMode, PairType, StackItem};
use crate::ops::compare;

use super::evaluator::Evaluator;
use super::opcode::{Addr, CmpOp, MemOp};

impl Evaluator {
    // ═══════════════════════════════════════════════════════════════════
    // Load and Store
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn load(&mut self, addr: Addr) {
        let idx = self.resolve(self.stack.top().raw_integer(), addr);
        let v = self.memory.get(idx);
        self.set_top(v);
    }

    /// Store an item, or NAN when the item may not live in the bank.
    /// Returns what was stored.
    fn put(&mut self, idx: i64, v: StackItem) -> StackItem {
        let stored = if admit(&v, &mut self.objects) { v } else { StackItem::Nan };
        self.memory.set(idx, stored);
        stored
    }

    /// `( idx v -- v )`
    pub(super) fn store(&mut self, addr: Addr) {
        let v = self.stack.pop();
        let idx = self.resolve(self.stack.top().raw_integer(), addr);
        let stored = self.put(idx, v);
        self.set_top(stored);
    }

    /// `( c idx v -- c )`
    pub(super) fn store_if(&mut self, addr: Addr) {
        let v = self.stack.pop();
        let idx = self.pop_address(addr);
        if self.stack.top().condition() {
            self.put(idx, v);
        }
    }

    /// Write consecutive items starting at an address.
    ///
    /// `( idx v1 .. vn -- n )`, or `( c idx v1 .. vn -- c )` for the
    /// conditional form. The indirect form advances the cursor cell past
    /// the written items.
    pub(super) fn write(&mut self, addr: Addr, nargs: usize, cond: bool) {
        let n = if cond { nargs.saturating_sub(1) } else { nargs };
        if n == 0 {
            if !cond {
                self.stack.push(StackItem::ZERO);
            }
            return;
        }
        let args = self.stack.pop_n(n);
        let (head, values) = args.split_at(1);
        let idx = head[0].raw_integer();
        let enabled = !cond || self.stack.top().condition();
        if enabled {
            let start = self.resolve(idx, addr);
            for (offset, v) in values.iter().enumerate() {
                let item = if admit(v, &mut self.objects) { *v } else { StackItem::None };
                self.memory.set(start.wrapping_add(offset as i64), item);
            }
            if addr == Addr::Indirect {
                self.memory.set(idx, StackItem::Integer(start.wrapping_add(values.len() as i64)));
            }
        }
        if !cond {
            self.stack.push(StackItem::Integer(values.len() as i64));
        }
    }

    /// `( dst src -- [src] )` or `( c dst src -- c )`
    pub(super) fn mov(&mut self, addr: Addr, cond: bool) {
        let src = self.pop_address(addr);
        let v = self.memory.get(src);
        if cond {
            let dst = self.pop_address(addr);
            if self.stack.top().condition() {
                self.memory.set(dst, v);
            }
        } else {
            let dst = self.resolve(self.stack.top().raw_integer(), addr);
            self.memory.set(dst, v);
            self.set_top(v);
        }
    }

    /// `( a1 a2 -- [a2] )` or `( c a1 a2 -- c )`, swapping the two cells.
    pub(super) fn xchg(&mut self, addr: Addr, cond: bool) {
        let a2 = self.pop_address(addr);
        if cond {
            let a1 = self.pop_address(addr);
            if self.stack.top().condition() {
                self.swap_cells(a1, a2);
            }
        } else {
            let a1 = self.resolve(self.stack.top().raw_integer(), addr);
            let old = self.swap_cells(a1, a2);
            self.set_top(old);
        }
    }

    /// Swap two cells, returning the previous content of `b`.
    fn swap_cells(&mut self, a: i64, b: i64) -> StackItem {
        let va = self.memory.get(a);
        let vb = self.memory.get(b);
        self.memory.set(a, vb);
        self.memory.set(b, va);
        vb
    }

    // ═══════════════════════════════════════════════════════════════════
    // Increment and Decrement
    // ═══════════════════════════════════════════════════════════════════

    fn step_cell(&mut self, idx: i64, delta: i64) -> StackItem {
        let cell = self.memory.get_mut(idx);
        *cell = match *cell {
            StackItem::Integer(i) => StackItem::Integer(i.wrapping_add(delta)),
            StackItem::Real(r) => StackItem::Real(r + delta as f64),
            other => other,
        };
        *cell
    }

    /// `( idx -- [idx] )` or `( c idx -- c )`
    pub(super) fn step(&mut self, addr: Addr, delta: i64, cond: bool) {
        if cond {
            let idx = self.pop_address(addr);
            if self.stack.top().condition() {
                self.step_cell(idx, delta);
            }
        } else {
            let idx = self.resolve(self.stack.top().raw_integer(), addr);
            let v = self.step_cell(idx, delta);
            self.set_top(v);
        }
    }

    /// Step the raw payload of a cell, keeping its tag.
    pub(super) fn raw_step(&mut self, delta: i64) {
        let idx = self.stack.top().raw_integer();
        let cell = self.memory.get_mut(idx);
        *cell = cell.with_bits(cell.raw_integer().wrapping_add(delta) as u64);
        let v = *cell;
        self.set_top(v);
    }

    /// `( idx x -- [idx] )`: fixed-point division of the raw payload.
    ///
    /// Multiplies by a 32-bit reciprocal, so the quotient may be off by
    /// one for large dividends.
    pub(super) fn raw_divide(&mut self) {
        let x = self.stack.pop().raw_integer();
        let idx = self.stack.top().raw_integer();
        let cell = self.memory.get_mut(idx);
        if x != 0 {
            let div = 1i64.wrapping_add(((1u64 << 32) / x as u64) as i64);
            *cell = cell.with_bits((cell.raw_integer().wrapping_mul(div) >> 32) as u64);
        }
        let v = *cell;
        self.set_top(v);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Compare and Arithmetic
    // ═══════════════════════════════════════════════════════════════════

    /// `( a b -- [a] <cmp> [b] )`
    pub(super) fn memory_compare(&mut self, addr: Addr, cmp: CmpOp, ctx: &EvalContext<'_>) {
        let b = self.pop_address(addr);
        let a = self.resolve(self.stack.top().raw_integer(), addr);
        let (x, y) = (self.memory.get(a), self.memory.get(b));
        let env = op_env!(self, ctx);
        let result = match cmp {
            CmpOp::Eq => compare::equ(&x, &y, &env),
            CmpOp::Neq => compare::neq(&x, &y, &env),
            CmpOp::Gt => compare::gt(&x, &y, &env),
            CmpOp::Gte => compare::gte(&x, &y, &env),
            CmpOp::Lt => compare::lt(&x, &y, &env),
            CmpOp::Lte => compare::lte(&x, &y, &env),
        };
        self.set_top(StackItem::boolean(result));
    }

    /// `( idx y -- [idx] )` or `( c idx y -- c )`, updating the cell in place.
    pub(super) fn memory_arith(&mut self, m: MemOp, cond: bool) {
        let y = self.stack.pop();
        if cond {
            let idx = self.stack.pop().raw_integer();
            if self.stack.top().condition() {
                let cell = self.memory.get(idx);
                self.memory.set(idx, cell_arith(cell, y, m));
            }
        } else {
            let idx = self.stack.top().raw_integer();
            let v = cell_arith(self.memory.get(idx), y, m);
            self.memory.set(idx, v);
            self.set_top(v);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Bank Stack
    // ═══════════════════════════════════════════════════════════════════

    /// `( v -- v )` or `( c v -- c )`
    pub(super) fn bank_push(&mut self, cond: bool) {
        if cond {
            let v = self.stack.pop();
            if self.stack.top().condition() {
                let item = if admit(&v, &mut self.objects) { v } else { StackItem::Nan };
                self.memory.push(item);
            }
        } else {
            let v = self.stack.top();
            let item = if admit(&v, &mut self.objects) { v } else { StackItem::Nan };
            self.memory.push(item);
            self.set_top(item);
        }
    }

    /// `( c -- v )`: pop the bank stack when the condition holds, else NONE.
    pub(super) fn bank_pop_if(&mut self) {
        let v = if self.stack.top().condition() { self.memory.pop() } else { StackItem::None };
        self.set_top(v);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Counters
    // ═══════════════════════════════════════════════════════════════════

    fn count_cell(&mut self, idx: i64) -> StackItem {
        let v = StackItem::Integer(self.memory.get(idx).raw_integer().wrapping_add(1));
        self.memory.set(idx, v);
        v
    }

    /// Count into the cell named by the first argument. Remaining arguments
    /// are evaluated for their side effects and dropped.
    ///
    /// `( idx .. -- [idx] )` or `( c idx .. -- c )`
    pub(super) fn count(&mut self, nargs: usize, cond: bool) {
        if cond {
            if nargs < 2 {
                if nargs == 0 {
                    self.stack.push(StackItem::None);
                }
                return;
            }
            self.stack.discard(nargs - 2);
            let idx = self.stack.pop().raw_integer();
            if self.stack.top().condition() {
                self.count_cell(idx);
            }
        } else {
            if nargs == 0 {
                self.stack.push(StackItem::None);
                return;
            }
            self.stack.discard(nargs - 1);
            let idx = self.stack.top().raw_integer();
            let v = self.count_cell(idx);
            self.set_top(v);
        }
    }

    /// Exponential smoothing `( idx v alpha -- [idx] )`.
    ///
    /// An integer alpha is reduced to its low bit. Non-numeric cells or
    /// samples leave the cell unchanged.
    pub(super) fn smooth(&mut self) {
        let alpha = self.stack.pop();
        let v = self.stack.pop();
        let idx = self.stack.top().raw_integer();
        let x = self.memory.get(idx);
        let a = match alpha {
            StackItem::Real(r) => Some(r),
            StackItem::Integer(i) => Some((i & 1) as f64),
            _ => None,
        };
        let numeric = PairType::of(x.item_type(), v.item_type()).is_numeric() && !x.is_nan() && !v.is_nan();
        let result = match a {
            Some(a) if numeric => {
                let (x0, v0) = (x.get_real(), v.get_real());
                let s = StackItem::Real(x0 + a * (v0 - x0));
                self.memory.set(idx, s);
                s
            }
            _ => x,
        };
        self.set_top(result);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Vertex Bitmap
    // ═══════════════════════════════════════════════════════════════════

    fn top_vertex_index(&self) -> Option<u64> {
        match self.stack.top() {
            StackItem::Vertex(v) => Some(v.index()),
            _ => None,
        }
    }

    /// `( v -- 1|0 )`: 1 when the vertex was not yet indexed.
    pub(super) fn index(&mut self) {
        let added = match self.top_vertex_index() {
            Some(i) => self.memory.bitmap_set(i),
            None => false,
        };
        self.set_top(StackItem::boolean(added));
    }

    pub(super) fn indexed(&mut self) {
        let found = self.top_vertex_index().is_some_and(|i| self.memory.bitmap_test(i));
        self.set_top(StackItem::boolean(found));
    }

    pub(super) fn unindex(&mut self) {
        if let Some(i) = self.top_vertex_index() {
            self.memory.bitmap_clear(i);
        }
        self.set_top(StackItem::ZERO);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Membership Set
    // ═══════════════════════════════════════════════════════════════════

    fn set_member(&self, mode: KeyMode) -> Option<(u32, u32)> {
        let x = self.stack.top();
        match mode {
            KeyMode::Integer => Some(integer_key(x.bits())),
            KeyMode::Vertex => match x {
                StackItem::Vertex(v) => Some(vertex_key(v.index())),
                _ => None,
            },
        }
    }

    /// `( x -- 1|0|-1 )`: -1 when the set could not grow.
    pub(super) fn set_add(&mut self, mode: KeyMode) {
        let result = match self.set_member(mode) {
            Some((key, item)) => self.memory.dwset_mut().insert(key, item, mode),
            None => 0,
        };
        if result < 0 {
            warn!(len = self.memory.dwset().len(), "membership set capacity exceeded");
        }
        self.set_top(StackItem::Integer(result));
    }

    pub(super) fn set_del(&mut self, mode: KeyMode) {
        let removed = match self.set_member(mode) {
            Some((key, item)) => self.memory.dwset_mut().remove(key, item),
            None => false,
        };
        self.set_top(StackItem::boolean(removed));
    }

    pub(super) fn set_has(&mut self, mode: KeyMode) {
        let found = match self.set_member(mode) {
            Some((key, item)) => self.memory.dwset().contains(key, item),
            None => false,
        };
        self.set_top(StackItem::boolean(found));
    }

    /// `( n -- n|-1 )`: clear the set and size it for `n` members.
    pub(super) fn set_initialize(&mut self) {
        let result = match self.stack.top() {
            StackItem::Integer(n) if self.memory.dwset_mut().initialize(n) => n,
            StackItem::Integer(_) => -1,
            _ => {
                self.memory.dwset_mut().clear();
                -1
            }
        };
        self.set_top(StackItem::Integer(result));
    }
}

/// Apply a bank arithmetic operator to a cell value.
///
/// Arithmetic follows integer/real promotion and leaves other cell types
/// alone. Division by a zero operand poisons the cell with NAN. Shifts and
/// bitwise operators work on the raw payload and keep the cell's tag.
pub(super) fn cell_arith(x: StackItem, y: StackItem, m: MemOp) -> StackItem {
    use StackItem::{Integer, Real};
    match m {
        MemOp::Add | MemOp::Sub | MemOp::Mul => {
            let (fi, fr): (fn(i64, i64) -> i64, fn(f64, f64) -> f64) = match m {
                MemOp::Add => (i64::wrapping_add, |a, b| a + b),
                MemOp::Sub => (i64::wrapping_sub, |a, b| a - b),
                _ => (i64::wrapping_mul, |a, b| a * b),
            };
            match (x, y) {
                (Integer(a), Integer(b)) => Integer(fi(a, b)),
                (Integer(a), Real(b)) => Real(fr(a as f64, b)),
                (Real(a), Integer(b)) => Real(fr(a, b as f64)),
                (Real(a), Real(b)) => Real(fr(a, b)),
                _ => x,
            }
        }
        MemOp::Div | MemOp::Mod if y.bits() == 0 => StackItem::Nan,
        MemOp::Div => match (x, y) {
            (Integer(a), Integer(b)) => Integer(a.wrapping_div(b)),
            (Integer(a), Real(b)) => Real(a as f64 / b),
            (Real(a), Integer(b)) => Real(a / b as f64),
            (Real(a), Real(b)) => Real(a / b),
            _ => x,
        },
        MemOp::Mod => match (x, y) {
            (Integer(a), Integer(b)) => Integer(a.wrapping_rem(b)),
            (Integer(a), Real(b)) => Real(a as f64 % b),
            (Real(a), Integer(b)) => Real(a % b as f64),
            (Real(a), Real(b)) => Real(a % b),
            _ => x,
        },
        MemOp::Shr | MemOp::Shl => {
            let s = y.raw_integer();
            let bits = match (m, s) {
                (_, s) if !(0..64).contains(&s) => 0,
                (MemOp::Shr, s) => x.bits() >> s,
                (_, s) => x.bits() << s,
            };
            x.with_bits(bits)
        }
        MemOp::And => x.with_bits(x.bits() & y.bits()),
        MemOp::Or => x.with_bits(x.bits() | y.bits()),
        MemOp::Xor => x.with_bits(x.bits() ^ y.bits()),
    }
}
