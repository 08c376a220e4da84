//! Slice operations over the memory bank.
//!
//! A slice is an inclusive address pair `a1 an` popped from the stack.
//! Both ends are masked into the bank and an end before the start gives
//! an empty slice. Element-wise pair operations take two equal-length
//! runs `A B n` that must fit the bank without wrapping. Sorting and the
//! heap operations address an unwrapped run `x k`.
//!
//! Unless noted otherwise an operation leaves the number of cells it
//! processed on the stack.

use std::ops::Range;

use crate::context::EvalContext;
use crate::core::{admit, Contiguous, EvalObject, ObjectRef, StackItem};
use crate::heap::{self, ArcHeadHeapItem, Polarity};
use crate::ops::arith::FLT_MIN;
use crate::ops::compare::{self, FLT_EPSILON};
use crate::ops::{cast, MathFn};

use super::evaluator::{Cast, Evaluator, Search};
use super::exec_memory::cell_arith;
use super::opcode::{Extreme, MemOp, RawOp, Reduce};

impl Evaluator {
    // ═══════════════════════════════════════════════════════════════════
    // Operands
    // ═══════════════════════════════════════════════════════════════════

    /// Pop `a1 an` and return the cell range they span.
    fn pop_slice(&mut self) -> Range<usize> {
        let an = self.stack.pop().raw_integer();
        let a1 = self.stack.pop().raw_integer();
        self.memory.slice(a1, an)
    }

    /// Pop `A B n`.
    fn pop_pair(&mut self) -> Contiguous {
        let n = self.stack.pop().raw_integer();
        let b = self.stack.pop().raw_integer();
        let a = self.stack.pop().raw_integer();
        self.memory.contiguous(a, b, n)
    }

    /// Pop `x k`.
    fn pop_run(&mut self) -> Option<Range<usize>> {
        let k = self.stack.pop().raw_integer();
        let x = self.stack.pop().raw_integer();
        self.memory.run(x, k)
    }

    /// Apply `f` to every cell of a slice. `f` returns false for cells it
    /// skipped; the count of processed cells is pushed.
    fn process(&mut self, range: Range<usize>, mut f: impl FnMut(&mut StackItem) -> bool) {
        let cells = &mut self.memory.cells_mut()[range];
        let n = cells.iter_mut().map(|c| f(c)).filter(|&done| done).count();
        self.stack.push(StackItem::Integer(n as i64));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Fill, Copy and Hash
    // ═══════════════════════════════════════════════════════════════════

    /// `( a1 an v -- n )`. Unstorable values write nothing.
    pub(super) fn mset(&mut self) {
        let v = self.stack.pop();
        let range = self.pop_slice();
        let n = if admit(&v, &mut self.objects) {
            self.memory.cells_mut()[range.clone()].fill(v);
            range.len()
        } else {
            0
        };
        self.stack.push(StackItem::Integer(n as i64));
    }

    /// Uniform reals in `[0, 1]`, or random bitvectors.
    pub(super) fn mrandomize(&mut self, bits: bool) {
        let range = self.pop_slice();
        for i in range.clone() {
            let item = if bits {
                StackItem::Bitvector(self.rand64())
            } else {
                StackItem::Real(self.rand63() as f64 / i64::MAX as f64)
            };
            self.memory.cells_mut()[i] = item;
        }
        self.stack.push(StackItem::Integer(range.len() as i64));
    }

    /// `( dest src n -- n )`
    pub(super) fn mcopy(&mut self) {
        let n = match self.pop_pair() {
            Contiguous::Ranges { a, b, n } if a != b => {
                self.memory.cells_mut().copy_within(b..b + n, a);
                n as i64
            }
            _ => 0,
        };
        self.stack.push(StackItem::Integer(n));
    }

    /// `( r src n -- n )`: copy to the address held in cell `r`, then
    /// advance that cursor by `n`.
    pub(super) fn mpwrite(&mut self) {
        let n = self.stack.pop().raw_integer();
        let src = self.stack.pop().raw_integer();
        let r = self.stack.pop().raw_integer();
        let cursor = self.memory.get(r);
        let dest = cursor.raw_integer();
        let written = match self.memory.contiguous(dest, src, n) {
            Contiguous::Ranges { a, b, n } if a != b => {
                self.memory.cells_mut().copy_within(b..b + n, a);
                self.memory.set(r, cursor.with_bits(dest.wrapping_add(n as i64) as u64));
                n as i64
            }
            _ => 0,
        };
        self.stack.push(StackItem::Integer(written));
    }

    /// `( dest obj -- n )`: unpack an array or map object into the bank.
    /// Nothing is written unless every element fits.
    pub(super) fn mcopyobj(&mut self) {
        let obj = self.stack.pop();
        let start = self.memory.addr(self.stack.top().raw_integer());
        let room = self.memory.len() - start;
        let items: Vec<StackItem> = match object_of(&obj).and_then(|r| self.objects.get(r)) {
            Some(EvalObject::IntArray(v)) => v.iter().map(|&i| StackItem::Integer(i)).collect(),
            Some(EvalObject::FloatArray(v)) => v.iter().map(|&r| StackItem::Real(r)).collect(),
            Some(EvalObject::Map(v)) => v.iter().map(|&kv| StackItem::Keyval(kv)).collect(),
            _ => Vec::new(),
        };
        let n = if items.len() <= room {
            self.memory.cells_mut()[start..start + items.len()].copy_from_slice(&items);
            items.len()
        } else {
            0
        };
        self.set_top(StackItem::Integer(n as i64));
    }

    pub(super) fn mhash(&mut self, ctx: &EvalContext<'_>) {
        let range = self.pop_slice();
        let env = op_env!(self, ctx);
        let cells = &mut self.memory.cells_mut()[range.clone()];
        for cell in cells {
            *cell = cast::hash(&*cell, &env);
        }
        self.stack.push(StackItem::Integer(range.len() as i64));
    }

    /// `( idx -- idx )`: terminate a sequence with NONE.
    pub(super) fn mterm(&mut self) {
        let idx = self.stack.top().raw_integer();
        self.memory.set(idx, StackItem::None);
    }

    /// `( idx -- n )`: cells before the first NONE, stopping at the end of the bank.
    pub(super) fn mlen(&mut self) {
        let start = self.memory.addr(self.stack.top().raw_integer());
        let n = self.memory.cells()[start..].iter().take_while(|c| !c.is_none()).count();
        self.set_top(StackItem::Integer(n as i64));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reductions
    // ═══════════════════════════════════════════════════════════════════

    /// `( dest a1 an -- result )`: the result is also stored at `dest`.
    ///
    /// The raw form reads every cell as a double; the typed form skips
    /// cells that are neither integer nor real.
    pub(super) fn mreduce(&mut self, kind: Reduce, raw: bool) {
        let range = self.pop_slice();
        let values: Vec<f64> = self.memory.cells()[range]
            .iter()
            .filter_map(|c| if raw { Some(c.raw_real()) } else { typed_real(c) })
            .collect();
        let result = StackItem::Real(reduce(kind, &values));
        let dest = self.stack.top().raw_integer();
        self.memory.set(dest, result);
        self.set_top(result);
    }

    /// `( dest a1 an -- index )`: store the extreme item at `dest` and
    /// leave its bank address.
    pub(super) fn mextreme(&mut self, e: Extreme) {
        let range = self.pop_slice();
        let cells = self.memory.cells();
        let mut index = range.start;
        let mut best = cells[range.start];
        for i in range {
            if beats(cells[i], best, e) {
                best = cells[i];
                index = i;
            }
        }
        let dest = self.stack.top().raw_integer();
        self.memory.set(dest, best);
        self.set_top(StackItem::Integer(index as i64));
    }

    /// Linear search for `v`. Bit-comparable pairs match on raw bits,
    /// everything else on `==`.
    pub(super) fn msearch(&mut self, ctx: &EvalContext<'_>, search: Search) {
        let v = self.stack.pop();
        let range = self.pop_slice();
        let env = op_env!(self, ctx);
        let bitwise = v.item_type().is_bit_comparable();
        let matches = |c: &StackItem| {
            if bitwise && c.item_type().is_bit_comparable() {
                c.bits() == v.bits()
            } else {
                compare::equ(c, &v, &env)
            }
        };
        let cells = self.memory.cells();
        let result = match search {
            Search::Contains => StackItem::boolean(cells[range].iter().any(matches)),
            Search::Count => StackItem::Integer(cells[range].iter().filter(|&c| matches(c)).count() as i64),
            Search::Index => {
                let found = cells[range.clone()].iter().position(matches);
                StackItem::Integer(found.map_or(-1, |i| (range.start + i) as i64))
            }
        };
        self.stack.push(result);
    }

    /// `( A B n -- -1|0|1 )`: lexicographic comparison of two runs. An
    /// invalid pair compares as `A < B`. The approximate form treats reals
    /// within single-precision epsilon as equal.
    pub(super) fn mcmp(&mut self, approximate: bool) {
        let r = match self.pop_pair() {
            Contiguous::Invalid => -1,
            Contiguous::Empty => 0,
            Contiguous::Ranges { a, b, .. } if a == b => 0,
            Contiguous::Ranges { a, b, n } => {
                let cells = self.memory.cells();
                (0..n)
                    .map(|i| cell_cmp(cells[a + i], cells[b + i], approximate))
                    .find(|&r| r != 0)
                    .unwrap_or(0)
            }
        };
        self.stack.push(StackItem::Integer(r));
    }

    /// `( a1 an b1 bm -- 1|0 )`: every item of A occurs in B with the same
    /// type and bits.
    pub(super) fn msubset(&mut self) {
        let b = self.pop_slice();
        let a = self.pop_slice();
        let cells = self.memory.cells();
        let subset = a.len() <= b.len()
            && cells[a].iter().all(|x| {
                cells[b.clone()].iter().any(|y| x.item_type() == y.item_type() && x.bits() == y.bits())
            });
        self.stack.push(StackItem::boolean(subset));
    }

    /// `( a1 an obj -- 1|0 )`: every probe key occurs in a map or integer
    /// array object. Keyval probes use their key, other items their integer.
    pub(super) fn msubsetobj(&mut self) {
        let obj = self.stack.pop();
        let range = self.pop_slice();
        let probes = &self.memory.cells()[range];
        let subset = match object_of(&obj).and_then(|r| self.objects.get(r)) {
            Some(map @ EvalObject::Map(_)) => probes.iter().all(|p| map.map_get(probe_key(p).0 as i32).is_some()),
            Some(EvalObject::IntArray(keys)) => probes.iter().all(|p| keys.contains(&probe_key(p).0)),
            _ => false,
        };
        self.stack.push(StackItem::boolean(subset));
    }

    /// `( a1 an obj -- real )`: sum of probe weight times object weight
    /// over matching keys. Integer arrays weigh 1.0 per element.
    pub(super) fn msumprodobj(&mut self) {
        let obj = self.stack.pop();
        let range = self.pop_slice();
        let probes = &self.memory.cells()[range];
        let sum: f64 = match object_of(&obj).and_then(|r| self.objects.get(r)) {
            Some(map @ EvalObject::Map(_)) => probes
                .iter()
                .filter_map(|p| {
                    let (key, weight) = probe_key(p);
                    map.map_get(key as i32).map(|kv| weight * kv.value() as f64)
                })
                .sum(),
            Some(EvalObject::IntArray(keys)) => probes
                .iter()
                .map(|p| {
                    let (key, weight) = probe_key(p);
                    weight * keys.iter().filter(|&&k| k == key).count() as f64
                })
                .sum(),
            _ => 0.0,
        };
        self.stack.push(StackItem::Real(sum));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scalar Transforms
    // ═══════════════════════════════════════════════════════════════════

    /// `( a1 an x -- n )`: apply `cell op= x` to a slice.
    ///
    /// Arithmetic needs an integer or real operand and skips cells of
    /// other types. Division scales by the reciprocal and always yields
    /// reals. A zero divisor poisons every cell with NAN.
    pub(super) fn mscalar(&mut self, m: MemOp) {
        let x = self.stack.pop();
        let range = self.pop_slice();
        let numeric_operand = matches!(x, StackItem::Integer(_) | StackItem::Real(_));
        match m {
            MemOp::Div | MemOp::Mod if x.bits() == 0 => self.process(range, |c| {
                *c = StackItem::Nan;
                true
            }),
            MemOp::Add | MemOp::Sub | MemOp::Mul | MemOp::Div | MemOp::Mod if !numeric_operand => {
                self.stack.push(StackItem::ZERO)
            }
            MemOp::Add | MemOp::Sub | MemOp::Mul | MemOp::Div | MemOp::Mod => {
                let (op, y) = match m {
                    MemOp::Div => (MemOp::Mul, StackItem::Real(1.0 / x.get_real())),
                    _ => (m, x),
                };
                self.process(range, |c| match c {
                    StackItem::Integer(_) | StackItem::Real(_) => {
                        *c = cell_arith(*c, y, op);
                        true
                    }
                    _ => false,
                })
            }
            _ => self.process(range, |c| {
                *c = cell_arith(*c, x, m);
                true
            }),
        }
    }

    /// Integer arithmetic on the raw payload of every cell, keeping tags.
    pub(super) fn mint_raw(&mut self, r: RawOp) {
        let x = if r.has_operand() { self.stack.pop().raw_integer() } else { 0 };
        let range = self.pop_slice();
        let (f, y): (fn(i64, i64) -> i64, i64) = match r {
            RawOp::Inc => (i64::wrapping_add, 1),
            RawOp::Dec => (i64::wrapping_sub, 1),
            RawOp::Add => (i64::wrapping_add, x),
            RawOp::Sub => (i64::wrapping_sub, x),
            RawOp::Mul => (i64::wrapping_mul, x),
            RawOp::Div | RawOp::Mod if x == 0 => {
                self.stack.push(StackItem::ZERO);
                return;
            }
            // Fixed-point reciprocal multiplier
            RawOp::Div => (|i, div| i.wrapping_mul(div) >> 32, 1i64.wrapping_add(((1u64 << 32) / x as u64) as i64)),
            RawOp::Mod => (i64::wrapping_rem, x),
        };
        self.process(range, |c| {
            *c = c.with_bits(f(c.raw_integer(), y) as u64);
            true
        });
    }

    /// Real arithmetic on the raw payload of every cell, keeping tags.
    pub(super) fn mreal_raw(&mut self, r: RawOp) {
        let operand = if r.has_operand() { self.stack.pop() } else { StackItem::ZERO };
        let range = self.pop_slice();
        let x = match operand {
            StackItem::Real(v) => v,
            other => other.raw_integer() as f64,
        };
        let (f, y): (fn(f64, f64) -> f64, f64) = match r {
            RawOp::Inc => (|v, y| v + y, 1.0),
            RawOp::Dec => (|v, y| v - y, 1.0),
            RawOp::Add => (|v, y| v + y, x),
            RawOp::Sub => (|v, y| v - y, x),
            RawOp::Mul => (|v, y| v * y, x),
            RawOp::Div | RawOp::Mod if operand.bits() == 0 => {
                self.stack.push(StackItem::ZERO);
                return;
            }
            RawOp::Div => (|v, y| v * y, 1.0 / x),
            RawOp::Mod => (|v, y| v % y, x),
        };
        self.process(range, |c| {
            *c = c.with_bits(f(c.raw_real(), y).to_bits());
            true
        });
    }

    /// `m<fn>` and `mr<fn>`.
    ///
    /// The typed form converts cells to reals first, except `abs`, `sign`
    /// and `popcnt` which keep integer cells integral. The raw form
    /// applies the function to every payload as a double.
    pub(super) fn munary(&mut self, f: MathFn, raw: bool) {
        let range = self.pop_slice();
        self.process(range, |c| {
            *c = if raw {
                c.with_bits(f.apply_real(c.raw_real()).to_bits())
            } else {
                match (f, *c) {
                    (MathFn::Popcnt, _) => StackItem::Integer(c.bits().count_ones() as i64),
                    (MathFn::Abs, StackItem::Real(r)) => StackItem::Real(r.abs()),
                    (MathFn::Abs, _) => c.with_bits(c.raw_integer().wrapping_abs() as u64),
                    (MathFn::Sign, StackItem::Real(r)) => StackItem::Real(f.apply_real(r)),
                    (MathFn::Sign, _) => c.with_bits(c.raw_integer().signum() as u64),
                    (_, cell) => StackItem::Real(f.apply_real(as_real(cell))),
                }
            };
            true
        });
    }

    pub(super) fn msq(&mut self, raw: bool) {
        let range = self.pop_slice();
        self.process(range, |c| {
            *c = match *c {
                StackItem::Real(r) if !raw => StackItem::Real(r * r),
                cell if raw => cell.with_bits((cell.raw_real() * cell.raw_real()).to_bits()),
                cell => {
                    let i = cell.raw_integer();
                    cell.with_bits(i.wrapping_mul(i) as u64)
                }
            };
            true
        });
    }

    /// `( a1 an y -- n )`
    pub(super) fn mpow(&mut self, raw: bool) {
        let y = match self.stack.pop() {
            StackItem::Real(r) => r,
            other => other.raw_integer() as f64,
        };
        let range = self.pop_slice();
        self.process(range, |c| {
            *c = if raw {
                c.with_bits(c.raw_real().powf(y).to_bits())
            } else {
                StackItem::Real(as_real(*c).powf(y))
            };
            true
        });
    }

    /// `minc`/`mdec`: numeric cells only.
    pub(super) fn mstep(&mut self, delta: i64) {
        let range = self.pop_slice();
        self.process(range, |c| match *c {
            StackItem::Integer(i) => {
                *c = StackItem::Integer(i.wrapping_add(delta));
                true
            }
            StackItem::Real(r) => {
                *c = StackItem::Real(r + delta as f64);
                true
            }
            _ => false,
        });
    }

    pub(super) fn mcast(&mut self, cast: Cast) {
        let range = self.pop_slice();
        self.process(range, |c| {
            *c = match (cast, *c) {
                (Cast::Trunc, StackItem::Real(r)) => StackItem::Integer(r as i64),
                (Cast::Round, StackItem::Real(r)) => StackItem::Integer(r.round() as i64),
                (Cast::Trunc | Cast::Round, cell) => StackItem::Integer(cell.raw_integer()),
                (Cast::Real, cell) => StackItem::Real(as_real(cell)),
                (Cast::Bits, cell) => StackItem::Bitvector(cell.bits()),
            };
            true
        });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Pair Transforms
    // ═══════════════════════════════════════════════════════════════════

    /// `( A B n -- n )`: element-wise `A[i] op= B[i]`. Pushes -1 for an
    /// invalid pair.
    ///
    /// Division always yields reals; a zero divisor is replaced by the
    /// smallest normal float. Integer modulo by zero gives 0.
    pub(super) fn mvector(&mut self, m: MemOp) {
        self.pairwise(|x, y| match m {
            MemOp::Div => vector_div(x, y),
            MemOp::Mod => vector_mod(x, y),
            _ => cell_arith(x, y, m),
        });
    }

    /// `( A B n -- n )`: element-wise minimum or maximum into A.
    pub(super) fn mvextreme(&mut self, e: Extreme) {
        self.pairwise(|x, y| if beats(y, x, e) { y } else { x });
    }

    fn pairwise(&mut self, f: impl Fn(StackItem, StackItem) -> StackItem) {
        let n = match self.pop_pair() {
            Contiguous::Invalid => -1,
            Contiguous::Empty => 0,
            Contiguous::Ranges { a, b, n } => {
                let cells = self.memory.cells_mut();
                for i in 0..n {
                    cells[a + i] = f(cells[a + i], cells[b + i]);
                }
                n as i64
            }
        };
        self.stack.push(StackItem::Integer(n));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Ordering
    // ═══════════════════════════════════════════════════════════════════

    /// `( x k -- count )`: sort a run with NONE at the tail and leave the
    /// number of leading values.
    pub(super) fn msort(&mut self, raw: bool, reverse: bool, ctx: &EvalContext<'_>) {
        let Some(range) = self.pop_run() else {
            self.stack.push(StackItem::ZERO);
            return;
        };
        let env = op_env!(self, ctx);
        let slice = &mut self.memory.cells_mut()[range];
        let count = if raw {
            heap::sort_raw_real(slice, !reverse)
        } else {
            heap::sort(slice, !reverse, &|a: &StackItem, b: &StackItem| compare::order(a, b, &env))
        };
        self.stack.push(StackItem::Integer(count as i64));
    }

    /// `( x k -- k )`
    pub(super) fn mreverse(&mut self) {
        let k = match self.pop_run() {
            Some(range) => {
                let len = range.len();
                self.memory.cells_mut()[range].reverse();
                len as i64
            }
            None => 0,
        };
        self.stack.push(StackItem::Integer(k));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Heaps
    // ═══════════════════════════════════════════════════════════════════

    /// `( h1 k -- k )`
    pub(super) fn mheapinit(&mut self) {
        let k = match self.pop_run() {
            Some(range) => {
                let len = range.len();
                heap::init(&mut self.memory.cells_mut()[range]);
                len as i64
            }
            None => 0,
        };
        self.stack.push(StackItem::Integer(k));
    }

    /// `( h1 k -- k )`
    pub(super) fn mheapify(&mut self, p: Polarity, ctx: &EvalContext<'_>) {
        let k = match self.pop_run() {
            Some(range) => {
                let len = range.len();
                let env = op_env!(self, ctx);
                let order = |a: &StackItem, b: &StackItem| compare::order(a, b, &env);
                heap::heapify(&mut self.memory.cells_mut()[range], p, &order);
                len as i64
            }
            None => 0,
        };
        self.stack.push(StackItem::Integer(k));
    }

    /// `( h1 k v -- 1|0 )`: offer one value to a top-k heap.
    pub(super) fn mheappush(&mut self, p: Polarity, ctx: &EvalContext<'_>) {
        let v = self.stack.pop();
        let admitted = match self.pop_run() {
            Some(range) => {
                let env = op_env!(self, ctx);
                let order = |a: &StackItem, b: &StackItem| compare::order(a, b, &env);
                heap::try_replace(&mut self.memory.cells_mut()[range], v, p, &order)
            }
            None => false,
        };
        self.stack.push(StackItem::boolean(admitted));
    }

    /// `( h1 k v1 .. vn -- count )`: offer several values, leaving how many
    /// were admitted.
    pub(super) fn mheapwrite(&mut self, p: Polarity, nargs: usize, ctx: &EvalContext<'_>) {
        if nargs < 3 {
            self.stack.discard(nargs);
            self.stack.push(StackItem::ZERO);
            return;
        }
        let args = self.stack.pop_n(nargs);
        let written = match self.memory.run(args[0].raw_integer(), args[1].raw_integer()) {
            Some(range) => {
                let env = op_env!(self, ctx);
                let order = |a: &StackItem, b: &StackItem| compare::order(a, b, &env);
                let heap = &mut self.memory.cells_mut()[range];
                args[2..].iter().filter(|v| heap::try_replace(heap, **v, p, &order)).count()
            }
            None => 0,
        };
        self.stack.push(StackItem::Integer(written as i64));
    }

    /// `( h1 k a1 an -- n )`: heapify, then stream a slice through the heap.
    pub(super) fn mheapsift(&mut self, p: Polarity, ctx: &EvalContext<'_>) {
        let source = self.pop_slice();
        let n = match self.pop_run() {
            Some(range) => {
                let items = self.memory.cells()[source].to_vec();
                let env = op_env!(self, ctx);
                let order = |a: &StackItem, b: &StackItem| compare::order(a, b, &env);
                heap::sift(&mut self.memory.cells_mut()[range], &items, p, &order) as i64
            }
            None => 0,
        };
        self.stack.push(StackItem::Integer(n));
    }

    /// Offer the vertex under evaluation to the cull heap.
    ///
    /// `( score k -- 1|0|-1 )` or `( c score k -- c )`. The heap capacity
    /// is fixed by the program, so `k` is ignored.
    pub(super) fn mcull(&mut self, ctx: &EvalContext<'_>, cond: bool) {
        self.stack.pop();
        let score = match self.stack.pop() {
            StackItem::Real(r) => r,
            other => other.raw_integer() as f64,
        };
        let item = ArcHeadHeapItem { score, vertex: ctx.this, predicator: ctx.arrive };
        if cond {
            if self.stack.top().condition() {
                self.cull.try_replace(item);
            }
        } else {
            let r = self.cull.try_replace(item);
            self.stack.push(StackItem::Integer(r));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Cell Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn object_of(item: &StackItem) -> Option<ObjectRef> {
    match *item {
        StackItem::CString(r) => Some(r),
        _ => None,
    }
}

/// Probe key and weight for the object set operations.
fn probe_key(p: &StackItem) -> (i64, f64) {
    match *p {
        StackItem::Keyval(kv) => (kv.key() as i64, kv.value() as f64),
        other => (other.raw_integer(), 1.0),
    }
}

fn typed_real(c: &StackItem) -> Option<f64> {
    match *c {
        StackItem::Integer(i) => Some(i as f64),
        StackItem::Real(r) => Some(r),
        _ => None,
    }
}

/// Real view of a cell for the converting transforms.
fn as_real(c: StackItem) -> f64 {
    match c {
        StackItem::Real(r) => r,
        other => other.raw_integer() as f64,
    }
}

/// `x` should replace `best` as the running minimum or maximum.
/// Numeric pairs compare by value, anything else by raw bits.
fn beats(x: StackItem, best: StackItem, e: Extreme) -> bool {
    use StackItem::{Integer, Real};
    let ordering = match (x, best) {
        (Integer(a), Integer(b)) => a.partial_cmp(&b),
        (Integer(a), Real(b)) => (a as f64).partial_cmp(&b),
        (Real(a), Integer(b)) => a.partial_cmp(&(b as f64)),
        (Real(a), Real(b)) => a.partial_cmp(&b),
        _ => x.bits().partial_cmp(&best.bits()),
    };
    match e {
        Extreme::Max => ordering == Some(std::cmp::Ordering::Greater),
        Extreme::Min => ordering == Some(std::cmp::Ordering::Less),
    }
}

fn cell_cmp(a: StackItem, b: StackItem, approximate: bool) -> i64 {
    use StackItem::{Integer, Real};
    fn sign<T: PartialOrd>(a: T, b: T) -> i64 {
        (a > b) as i64 - (a < b) as i64
    }
    let reals = match (a, b) {
        (Integer(x), Integer(y)) => return sign(x, y),
        (Integer(x), Real(y)) => (x as f64, y),
        (Real(x), Integer(y)) => (x, y as f64),
        (Real(x), Real(y)) => (x, y),
        _ => return sign(a.bits(), b.bits()),
    };
    if approximate && (reals.0 - reals.1).abs() < FLT_EPSILON {
        return 0;
    }
    sign(reals.0, reals.1)
}

fn reduce(kind: Reduce, values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let inverse = |x: f64| if x != 0.0 { 1.0 / x } else { 1.0 / FLT_MIN };
    match kind {
        Reduce::Sum => values.iter().sum(),
        Reduce::SumSqr => values.iter().map(|x| x * x).sum(),
        Reduce::Stdev => running_stdev(values.iter().copied()),
        Reduce::InvSum => values.iter().map(|&x| inverse(x)).sum(),
        Reduce::Prod => values.iter().product(),
        Reduce::Mean if values.is_empty() => 0.0,
        Reduce::Mean => values.iter().sum::<f64>() / n,
        Reduce::HarmMean => {
            let invsum: f64 = values.iter().map(|&x| inverse(x)).sum();
            if invsum != 0.0 {
                n / invsum
            } else {
                0.0
            }
        }
        Reduce::GeoMean => {
            if values.is_empty() || values.contains(&0.0) {
                return 0.0;
            }
            let logsum: f64 = values.iter().map(|x| x.abs().log2()).sum();
            let negatives = values.iter().filter(|&&x| x < 0.0).count();
            let sign = if negatives % 2 == 1 { -1.0 } else { 1.0 };
            sign * (logsum / n).exp2()
        }
        Reduce::GeoStdev => {
            if values.iter().any(|&x| x <= 0.0) {
                return 1.0;
            }
            running_stdev(values.iter().map(|x| x.ln())).exp()
        }
    }
}

/// Population standard deviation by Welford's running update.
fn running_stdev(values: impl Iterator<Item = f64>) -> f64 {
    let (mut a, mut q, mut k) = (0.0, 0.0, 0.0);
    for x in values {
        k += 1.0;
        let next = a + (x - a) / k;
        q += (x - a) * (x - next);
        a = next;
    }
    if k > 0.0 {
        (q / k).sqrt()
    } else {
        0.0
    }
}

fn vector_div(x: StackItem, y: StackItem) -> StackItem {
    use StackItem::{Integer, Real};
    let (a, mut b) = match (x, y) {
        (Integer(a), Integer(b)) => (a as f64, b as f64),
        (Integer(a), Real(b)) => (a as f64, b),
        (Real(a), Integer(b)) => (a, b as f64),
        (Real(a), Real(b)) => (a, b),
        _ => (0.0, 1.0),
    };
    if y.bits() == 0 {
        b = FLT_MIN;
    }
    Real(a / b)
}

fn vector_mod(x: StackItem, y: StackItem) -> StackItem {
    use StackItem::{Integer, Real};
    let zero = y.bits() == 0;
    let divisor = |b: f64| if zero { FLT_MIN } else { b };
    match (x, y) {
        (Integer(_), Integer(_)) if zero => Integer(0),
        (Integer(a), Integer(b)) => Integer(a.wrapping_rem(b)),
        (Integer(a), Real(b)) => Real((a as f64) % divisor(b)),
        (Real(a), Integer(b)) => Real(a % divisor(b as f64)),
        (Real(a), Real(b)) => Real(a % divisor(b)),
        _ => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::context::EvalContext;
    use crate::core::{KeyVal, VertexRef};
    use crate::vm::{Addr, Evaluator, Op, OpArg, OpCode, Program};

    fn int(i: i64) -> Op {
        Op::push(OpArg::Int(i))
    }

    fn real(r: f64) -> Op {
        Op::push(OpArg::Real(r))
    }

    /// Ops writing `values` to consecutive cells from `at`.
    fn fill(at: i64, values: &[Op]) -> Vec<Op> {
        let mut ops = vec![int(at)];
        ops.extend_from_slice(values);
        ops.push(Op::variadic(OpCode::Write(Addr::Direct), values.len() as i64 + 1));
        ops.push(Op::bare(OpCode::Pop));
        ops
    }

    fn run(ops: Vec<Op>) -> (StackItem, Evaluator) {
        let mut vm = Evaluator::new(Program::new(ops), EvalConfig::default()).unwrap();
        let value = vm.evaluate(&mut EvalContext::detached()).value;
        (value, vm)
    }

    #[test]
    fn test_mset_and_sum() {
        let ops = vec![
            int(0),
            int(3),
            int(2),
            Op::bare(OpCode::MSet),
            Op::bare(OpCode::Pop),
            int(10),
            int(0),
            int(3),
            Op::bare(OpCode::MReduce { kind: Reduce::Sum, raw: false }),
        ];
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Real(8.0));
        assert_eq!(vm.memory().get(10), StackItem::Real(8.0));
    }

    #[test]
    fn test_typed_reductions_skip_non_numeric() {
        let mut ops = fill(0, &[int(2), Op::push(OpArg::None), real(4.0), int(6)]);
        ops.extend([int(10), int(0), int(3), Op::bare(OpCode::MReduce { kind: Reduce::Mean, raw: false })]);
        assert_eq!(run(ops).0, StackItem::Real(4.0));
    }

    #[test]
    fn test_reduce_helpers() {
        assert_eq!(reduce(Reduce::Stdev, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_eq!(reduce(Reduce::HarmMean, &[1.0, 2.0, 4.0]), 3.0 / 1.75);
        assert!((reduce(Reduce::GeoMean, &[2.0, 8.0]) - 4.0).abs() < 1e-12);
        assert!((reduce(Reduce::GeoMean, &[-2.0, 8.0]) + 4.0).abs() < 1e-12);
        assert_eq!(reduce(Reduce::GeoMean, &[0.0, 8.0]), 0.0);
        assert_eq!(reduce(Reduce::GeoStdev, &[3.0, 3.0]), 1.0);
    }

    #[test]
    fn test_mscalar_skips_other_types() {
        let mut ops = fill(0, &[int(1), real(1.5), Op::push(OpArg::Bits(7))]);
        ops.extend([int(0), int(2), int(2), Op::bare(OpCode::MScalar(MemOp::Add))]);
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Integer(2));
        assert_eq!(vm.memory().get(0), StackItem::Integer(3));
        assert_eq!(vm.memory().get(1), StackItem::Real(3.5));
        assert_eq!(vm.memory().get(2), StackItem::Bitvector(7));
    }

    #[test]
    fn test_mscalar_division() {
        let mut ops = fill(0, &[int(5), real(1.0)]);
        ops.extend([int(0), int(1), int(2), Op::bare(OpCode::MScalar(MemOp::Div))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Real(2.5));
        assert_eq!(vm.memory().get(1), StackItem::Real(0.5));

        let ops = vec![int(0), int(1), int(0), Op::bare(OpCode::MScalar(MemOp::Mod))];
        let (_, vm) = run(ops);
        assert!(vm.memory().get(0).is_nan());
    }

    #[test]
    fn test_mvector_add_and_div() {
        let mut ops = fill(0, &[int(1), int(2), int(10), real(0.5)]);
        ops.extend([int(0), int(2), int(2), Op::bare(OpCode::MVector(MemOp::Add))]);
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Integer(2));
        assert_eq!(vm.memory().get(0), StackItem::Integer(11));
        assert_eq!(vm.memory().get(1), StackItem::Real(2.5));

        let mut ops = fill(0, &[int(3), int(0)]);
        ops.extend([int(0), int(1), int(1), Op::bare(OpCode::MVector(MemOp::Div))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Real(3.0 / FLT_MIN));

        let ops = vec![int(0), int(1), int(-1), Op::bare(OpCode::MVector(MemOp::Add))];
        assert_eq!(run(ops).0, StackItem::Integer(-1));
    }

    #[test]
    fn test_mextreme_and_mvextreme() {
        let mut ops = fill(0, &[int(4), real(9.5), int(-2)]);
        ops.extend([int(10), int(0), int(2), Op::bare(OpCode::MExtreme(Extreme::Max))]);
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Integer(1));
        assert_eq!(vm.memory().get(10), StackItem::Real(9.5));

        let mut ops = fill(0, &[int(1), int(8), int(5), int(3)]);
        ops.extend([int(0), int(2), int(2), Op::bare(OpCode::MVExtreme(Extreme::Max))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Integer(5));
        assert_eq!(vm.memory().get(1), StackItem::Integer(8));
    }

    #[test]
    fn test_msearch() {
        let mut ops = fill(0, &[int(3), real(7.0), int(3)]);
        ops.extend([int(0), int(2), int(3), Op::bare(OpCode::MCount)]);
        assert_eq!(run(ops).0, StackItem::Integer(2));
        let mut ops = fill(4, &[int(3), real(7.0)]);
        ops.extend([int(4), int(5), int(7), Op::bare(OpCode::MIndex)]);
        assert_eq!(run(ops).0, StackItem::Integer(5));
        let ops = vec![int(0), int(3), int(99), Op::bare(OpCode::MContains)];
        assert_eq!(run(ops).0, StackItem::ZERO);
    }

    #[test]
    fn test_mcmp() {
        let mut ops = fill(0, &[int(1), int(2), int(1), int(3)]);
        ops.extend([int(0), int(2), int(2), Op::bare(OpCode::MCmp)]);
        assert_eq!(run(ops).0, StackItem::Integer(-1));
        let mut ops = fill(0, &[real(1.0), real(1.0 + 1e-9)]);
        ops.extend([int(0), int(1), int(1), Op::bare(OpCode::MCmpa)]);
        assert_eq!(run(ops).0, StackItem::ZERO);
        assert_eq!(cell_cmp(StackItem::Real(1.0), StackItem::Real(1.0 + 1e-9), false), -1);
    }

    #[test]
    fn test_msubset() {
        let mut ops = fill(0, &[int(2), int(3), int(1), int(2), int(3)]);
        ops.extend([int(0), int(1), int(2), int(4), Op::bare(OpCode::MSubset)]);
        assert_eq!(run(ops).0, StackItem::ONE);
        let mut ops = fill(0, &[int(2), real(2.0), int(2)]);
        ops.extend([int(1), int(1), int(2), int(2), Op::bare(OpCode::MSubset)]);
        assert_eq!(run(ops).0, StackItem::ZERO);
    }

    #[test]
    fn test_object_probes() {
        let mut program = Program::builder();
        let map = program.constant(EvalObject::map(vec![KeyVal::new(1, 0.5), KeyVal::new(2, 2.0)]));
        let ops = vec![
            int(0),
            int(2),
            real(3.0),
            Op::bare(OpCode::Keyval),
            int(1),
            Op::variadic(OpCode::Write(Addr::Direct), 3),
            Op::bare(OpCode::Pop),
            int(0),
            int(1),
            Op::push(OpArg::Object(map)),
            Op::bare(OpCode::MSumProdObj),
            int(0),
            int(1),
            Op::push(OpArg::Object(map)),
            Op::bare(OpCode::MSubsetObj),
        ];
        let program = ops.into_iter().fold(program, |p, op| p.op(op));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        let result = vm.evaluate(&mut EvalContext::detached());
        assert_eq!(result.value, StackItem::ONE);
        assert_eq!(vm.stack().peek(1), StackItem::Real(6.5));
    }

    #[test]
    fn test_mcopyobj_unpacks_arrays() {
        let mut program = Program::builder();
        let array = program.constant(EvalObject::IntArray(vec![4, 5, 6]));
        let program = program
            .op(int(8))
            .op(Op::push(OpArg::Object(array)))
            .op(Op::bare(OpCode::MCopyObj));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        assert_eq!(vm.evaluate(&mut EvalContext::detached()).value, StackItem::Integer(3));
        assert_eq!(vm.memory().get(10), StackItem::Integer(6));
    }

    #[test]
    fn test_unary_transforms() {
        let mut ops = fill(0, &[int(-3), real(-2.5), int(4)]);
        ops.extend([int(0), int(2), Op::bare(OpCode::MUnary(MathFn::Abs))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Integer(3));
        assert_eq!(vm.memory().get(1), StackItem::Real(2.5));

        let mut ops = fill(0, &[int(4), int(9)]);
        ops.extend([int(0), int(1), Op::bare(OpCode::MUnary(MathFn::Sqrt))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(1), StackItem::Real(3.0));

        let mut ops = fill(0, &[real(2.7), int(5)]);
        ops.extend([int(0), int(1), Op::bare(OpCode::MToInt)]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Integer(2));
    }

    #[test]
    fn test_raw_integer_family() {
        let mut ops = fill(0, &[int(100), int(7)]);
        ops.extend([int(0), int(1), int(10), Op::bare(OpCode::MInt(RawOp::Div))]);
        let (_, vm) = run(ops);
        assert_eq!(vm.memory().get(0), StackItem::Integer(10));
        let ops = vec![int(0), int(1), int(0), Op::bare(OpCode::MInt(RawOp::Mod))];
        assert_eq!(run(ops).0, StackItem::ZERO);
    }

    #[test]
    fn test_raw_families_apply_each_op() {
        let raw = |cell: Op, code: OpCode, operand: Option<Op>| {
            let mut ops = fill(0, &[cell]);
            ops.extend([int(0), int(1)]);
            ops.extend(operand);
            ops.push(Op::bare(code));
            let (n, vm) = run(ops);
            assert_eq!(n, StackItem::ONE, "{code:?}");
            vm.memory().get(0)
        };
        let cases = [
            (RawOp::Inc, None, 21),
            (RawOp::Dec, None, 19),
            (RawOp::Add, Some(5), 25),
            (RawOp::Sub, Some(5), 15),
            (RawOp::Mul, Some(3), 60),
            (RawOp::Div, Some(4), 5),
            (RawOp::Mod, Some(6), 2),
        ];
        for (r, x, want) in cases {
            assert_eq!(raw(int(20), OpCode::MInt(r), x.map(int)), StackItem::Integer(want), "mint {r:?}");
        }
        let cases = [
            (RawOp::Inc, None, 7.0),
            (RawOp::Dec, None, 5.0),
            (RawOp::Add, Some(1.5), 7.5),
            (RawOp::Sub, Some(1.5), 4.5),
            (RawOp::Mul, Some(2.0), 12.0),
            (RawOp::Div, Some(4.0), 1.5),
            (RawOp::Mod, Some(4.0), 2.0),
        ];
        for (r, x, want) in cases {
            assert_eq!(raw(real(6.0), OpCode::MRaw(r), x.map(real)), StackItem::Real(want), "mraw {r:?}");
        }
    }

    #[test]
    fn test_msort_counts_values() {
        let mut ops = fill(0, &[int(3), Op::push(OpArg::None), int(1), real(2.0)]);
        ops.extend([int(0), int(4), Op::bare(OpCode::MSort { raw: false, reverse: false })]);
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Integer(3));
        assert_eq!(vm.memory().get(0), StackItem::Integer(1));
        assert_eq!(vm.memory().get(1), StackItem::Real(2.0));
        assert_eq!(vm.memory().get(2), StackItem::Integer(3));
        assert!(vm.memory().get(3).is_none());

        let ops = vec![int(1020), int(10), Op::bare(OpCode::MSort { raw: false, reverse: false })];
        assert_eq!(run(ops).0, StackItem::ZERO);
    }

    #[test]
    fn test_oversized_runs_are_rejected() {
        let huge = i64::MAX;
        let cases = [
            (vec![int(1), int(huge), Op::bare(OpCode::MHeapInit)], StackItem::ZERO),
            (vec![int(1), int(huge), Op::bare(OpCode::MHeapify(Polarity::Min))], StackItem::ZERO),
            (vec![int(1), int(huge), int(5), Op::bare(OpCode::MHeapPush(Polarity::Max))], StackItem::ZERO),
            (vec![int(huge), int(huge), Op::bare(OpCode::MSort { raw: false, reverse: false })], StackItem::ZERO),
            (vec![int(1), int(huge), Op::bare(OpCode::MReverse)], StackItem::ZERO),
            (vec![int(0), int(1), int(huge), Op::bare(OpCode::MVector(MemOp::Add))], StackItem::Integer(-1)),
        ];
        for (ops, expected) in cases {
            let (value, vm) = run(ops);
            assert_eq!(value, expected);
            assert!(vm.memory().cells().iter().all(|c| *c == StackItem::ZERO));
        }
    }

    #[test]
    fn test_heap_push_keeps_min_root() {
        let mut ops = vec![int(0), int(4), Op::bare(OpCode::MHeapInit), Op::bare(OpCode::Pop)];
        for v in [5, 1, 3, 2] {
            ops.extend([int(0), int(4), int(v), Op::bare(OpCode::MHeapPush(Polarity::Min)), Op::bare(OpCode::Pop)]);
        }
        ops.push(int(0));
        let (_, vm) = run(ops);
        let cells = &vm.memory().cells()[0..4];
        let order = |a: &StackItem, b: &StackItem| a.get_real().partial_cmp(&b.get_real());
        assert!(heap::is_heap(cells, Polarity::Min, &order));
        assert_eq!(cells[0], StackItem::Integer(1));
    }

    #[test]
    fn test_heap_write_retains_top_k() {
        let ops = vec![
            int(0),
            int(2),
            Op::bare(OpCode::MHeapInit),
            Op::bare(OpCode::Pop),
            int(0),
            int(2),
            int(4),
            int(9),
            int(1),
            int(7),
            Op::variadic(OpCode::MHeapWrite(Polarity::Min), 6),
        ];
        let (value, vm) = run(ops);
        assert_eq!(value, StackItem::Integer(3));
        assert_eq!(vm.memory().get(0), StackItem::Integer(7));
        assert_eq!(vm.memory().get(1), StackItem::Integer(9));
    }

    #[test]
    fn test_mcull_retains_best() {
        let program = Program::new(vec![real(0.75), int(2), Op::bare(OpCode::MCull)]).with_cull(2);
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        for v in 1..=3 {
            let mut ctx = EvalContext::detached().with_vertices(None, Some(VertexRef(v)), None);
            assert_eq!(vm.evaluate(&mut ctx).value, StackItem::Integer(if v <= 2 { 1 } else { 0 }));
        }
        let mut kept: Vec<_> = vm.culled().iter().filter_map(|h| h.vertex).collect();
        kept.sort_by_key(|v| v.0);
        assert_eq!(kept, vec![VertexRef(1), VertexRef(2)]);
    }
}
