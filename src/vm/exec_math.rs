//! Arithmetic, casts, bitwise, string, vector and probe operators.
//!
//! Binary operators read `x` below `y` and leave the result in `x`'s slot.
//! The item-level rules live in [`crate::ops`]; this file only moves
//! operands between the stack and those functions.

use crate::context::EvalContext;
use crate::core::{ObjectRef, PairType, StackItem, VectorObject};
use crate::ops::{arith, bitwise, cast, text};
use crate::probe;
use crate::similarity::Similarity;

use super::evaluator::Evaluator;
use super::opcode::{Kernel, OpCode};

/// Object handle behind a string or vector item.
#[inline]
fn object_ref(item: &StackItem) -> Option<ObjectRef> {
    match *item {
        StackItem::CString(r) | StackItem::Vector(r) => Some(r),
        _ => None,
    }
}

impl Evaluator {
    // ═══════════════════════════════════════════════════════════════════
    // Scalar Operators
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn binary(&mut self, code: OpCode, ctx: &EvalContext<'_>) {
        let y = self.stack.pop();
        let x = self.stack.top();
        let mut env = op_env!(self, ctx);
        let result = match code {
            OpCode::Add => arith::add(x, y, &mut env),
            OpCode::Sub => arith::sub(x, y, &mut env),
            OpCode::Mul => arith::mul(x, y, &mut env),
            OpCode::Div => arith::div(x, y),
            OpCode::Mod => arith::modulo(x, y),
            OpCode::Pow => arith::pow(x, y),
            OpCode::Max => arith::max(x, y, &env),
            OpCode::Min => arith::min(x, y, &env),
            OpCode::Atan2 => arith::atan2(x, y),
            OpCode::LogB => arith::log_base(x, y),
            OpCode::Prox => arith::prox(x, y),
            OpCode::Comb => arith::comb(x, y),
            OpCode::Keyval => cast::keyval(x, y),
            OpCode::Shl => bitwise::shl(x, y),
            OpCode::Shr => bitwise::shr(x, y),
            OpCode::BAnd => bitwise::band(x, y),
            OpCode::BOr => bitwise::bor(x, y),
            OpCode::BXor => bitwise::bxor(x, y),
            OpCode::StrCmp => text::strcmp(x, y, &env),
            OpCode::StrCaseCmp => text::strcasecmp(x, y, &env),
            OpCode::StartsWith => text::startswith(x, y, &env),
            OpCode::EndsWith => text::endswith(x, y, &env),
            OpCode::Contains => text::contains(x, y, &env),
            OpCode::Prefix => text::prefix(x, y, &mut env),
            OpCode::Idx => text::idx(x, y, &env),
            OpCode::MapGet => text::mapget(x, y, &env),
            _ => x,
        };
        self.set_top(result);
    }

    pub(super) fn unary(&mut self, code: OpCode, ctx: &EvalContext<'_>) {
        let x = self.stack.top();
        let mut env = op_env!(self, ctx);
        let result = match code {
            OpCode::Math(f) => arith::unary(f, x, &mut env),
            OpCode::Int => cast::int(x),
            OpCode::Intr => cast::intr(x),
            OpCode::AsInt => cast::asint(x, &env),
            OpCode::AsBits => cast::asbits(x),
            OpCode::Real => cast::real(x),
            OpCode::AsReal => cast::asreal(x, &env),
            OpCode::Bitvector => cast::bitvector(x),
            OpCode::Str => cast::str(x, &mut env),
            OpCode::Len => cast::len(x, &env),
            OpCode::Hash => cast::hash(&x, &env),
            OpCode::BNot => bitwise::bnot(x),
            _ => x,
        };
        self.set_top(result);
    }

    pub(super) fn approx(&mut self) {
        let err = self.stack.pop();
        let y = self.stack.pop();
        let x = self.stack.top();
        self.set_top(arith::approx(x, y, err));
    }

    /// `( lat1 lon1 lat2 lon2 -- x )` for the two geo scorers.
    pub(super) fn geo(&mut self, code: OpCode) {
        let lon2 = self.stack.pop();
        let lat2 = self.stack.pop();
        let lon1 = self.stack.pop();
        let lat1 = self.stack.top();
        let score = match code {
            OpCode::GeoProx => arith::geoprox,
            _ => arith::havdist,
        };
        self.set_top(score(lat1, lon1, lat2, lon2));
    }

    /// `idx % mod + offset`, leaving `idx` alone unless `mod` is positive.
    pub(super) fn modindex(&mut self) {
        let offset = self.stack.pop();
        let modulus = self.stack.pop().get_integer();
        if modulus > 0 {
            let idx = self.stack.top().raw_integer();
            self.set_top(StackItem::Integer((idx % modulus).wrapping_add(offset.raw_integer())));
        }
    }

    /// Variadic string builders.
    pub(super) fn gather(&mut self, code: OpCode, n: usize, ctx: &EvalContext<'_>) {
        let args = self.stack.pop_n(n);
        let mut env = op_env!(self, ctx);
        let result = match code {
            OpCode::Bytes => cast::bytes(&args, &mut env),
            _ => text::join(&args, &mut env),
        };
        self.stack.push(result);
    }

    pub(super) fn ternary_text(&mut self, code: OpCode, ctx: &EvalContext<'_>) {
        let c = self.stack.pop();
        let b = self.stack.pop();
        let a = self.stack.top();
        let mut env = op_env!(self, ctx);
        let result = match code {
            OpCode::Replace => text::replace(a, b, c, &mut env),
            _ => text::slice(a, b, c, &mut env),
        };
        self.set_top(result);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Vectors
    // ═══════════════════════════════════════════════════════════════════

    fn vector_of(&self, item: &StackItem) -> Option<&VectorObject> {
        match *item {
            StackItem::Vector(r) => self.objects.vector(r),
            _ => None,
        }
    }

    pub(super) fn vector_pair(&mut self, f: impl Fn(&dyn Similarity, &VectorObject, &VectorObject) -> f64) {
        let y = self.stack.pop();
        let x = self.stack.top();
        let result = match (self.vector_of(&x), self.vector_of(&y)) {
            (Some(a), Some(b)) => StackItem::Real(f(&*self.similarity, a, b)),
            _ => StackItem::Nan,
        };
        self.set_top(result);
    }

    pub(super) fn magnitude(&mut self) {
        let x = self.stack.top();
        let result = match self.vector_of(&x) {
            Some(a) => StackItem::Real(self.similarity.magnitude(a)),
            None => StackItem::Nan,
        };
        self.set_top(result);
    }

    /// Fingerprint distance of vectors, differing bits of integers.
    pub(super) fn hamdist(&mut self) {
        let y = self.stack.pop();
        let x = self.stack.top();
        let result = match (self.vector_of(&x), self.vector_of(&y)) {
            (Some(a), Some(b)) => StackItem::Integer(self.similarity.hamming(a, b)),
            _ if PairType::of(x.item_type(), y.item_type()).is_integer_compatible() => {
                StackItem::Integer((x.bits() ^ y.bits()).count_ones() as i64)
            }
            _ => StackItem::Nan,
        };
        self.set_top(result);
    }

    /// pi8 kernels over the bytes of strings or vectors. Unusable operands
    /// give 0.0.
    pub(super) fn kernel(&mut self, k: Kernel) {
        let b = if k.is_unary() { StackItem::None } else { self.stack.pop() };
        let a = self.stack.top();
        let objects = &self.objects;
        let view = |item: StackItem| object_ref(&item).and_then(|r| objects.byte_view(r));
        let kernels = self.similarity.kernels();
        let score = match k {
            Kernel::Ssq => view(a).map(|(a, _)| kernels.ssq(a)),
            Kernel::RsqrtSsq => view(a).map(|(a, _)| kernels.rsqrtssq(a)),
            Kernel::Ecld => view(a).zip(view(b)).map(|((a, fa), (b, fb))| kernels.ecld(a, fa, b, fb)),
            Kernel::Dp => view(a).zip(view(b)).map(|((a, _), (b, _))| kernels.dp(a, b)),
            Kernel::Cos => view(a).zip(view(b)).map(|((a, _), (b, _))| kernels.cos(a, b)),
        };
        self.set_top(StackItem::Real(score.unwrap_or(0.0)));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Token Probes
    // ═══════════════════════════════════════════════════════════════════

    /// Match the bank slice `[p1, pn]` against an integer array constant.
    ///
    /// Stack: ( p1 pn array boost -- score ) or, for the alt and super
    /// variants, ( p1 pn array boost deboost -- score ).
    pub(super) fn probe(&mut self, alt: bool, superset: bool) {
        let deboost = if alt { self.stack.pop() } else { StackItem::None };
        let boost = self.stack.pop();
        let array = self.stack.pop();
        let pn = self.stack.pop().raw_integer();
        let p1 = self.stack.top().raw_integer();

        let range = self.memory.slice(p1, pn);
        let probe = &self.memory.cells()[range];
        let tokens = match array {
            StackItem::CString(r) => self.objects.int_array(r),
            _ => None,
        };
        let result = match tokens {
            Some(tokens) if !probe.is_empty() => {
                if !alt {
                    StackItem::Integer(probe::probe_array(probe, tokens, &boost))
                } else if superset {
                    StackItem::Real(probe::probe_super_array(probe, tokens, &boost, &deboost))
                } else {
                    StackItem::Real(probe::probe_alt_array(probe, tokens, &boost, &deboost))
                }
            }
            _ if alt => StackItem::Real(0.0),
            _ => StackItem::ZERO,
        };
        self.set_top(result);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvalConfig;
    use crate::context::EvalContext;
    use crate::core::{EvalObject, StackItem, VectorObject};
    use crate::ops::MathFn;
    use crate::vm::{Evaluator, Kernel, Op, OpArg, OpCode, Program};

    fn int(i: i64) -> Op {
        Op::push(OpArg::Int(i))
    }

    fn eval(program: Program) -> StackItem {
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        vm.evaluate(&mut EvalContext::detached()).value
    }

    #[test]
    fn test_arithmetic_promotion() {
        let program = Program::new(vec![int(7), Op::push(OpArg::Real(0.5)), Op::bare(OpCode::Add)]);
        assert_eq!(eval(program), StackItem::Real(7.5));
        let program = Program::new(vec![int(7), int(2), Op::bare(OpCode::Div)]);
        assert_eq!(eval(program), StackItem::Real(3.5));
        let program = Program::new(vec![int(-9), Op::bare(OpCode::Math(MathFn::Abs))]);
        assert_eq!(eval(program), StackItem::Integer(9));
    }

    #[test]
    fn test_modindex() {
        let program = Program::new(vec![int(17), int(5), int(100), Op::bare(OpCode::ModIndex)]);
        assert_eq!(eval(program), StackItem::Integer(102));
        let program = Program::new(vec![int(17), int(0), int(100), Op::bare(OpCode::ModIndex)]);
        assert_eq!(eval(program), StackItem::Integer(17));
    }

    #[test]
    fn test_join_returns_text() {
        let mut program = Program::builder();
        let sep = program.string("-");
        let a = program.string("graph");
        let program = program
            .op(Op::push(sep))
            .op(Op::push(a))
            .op(int(42))
            .op(Op::variadic(OpCode::Join, 3));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        let result = vm.evaluate(&mut EvalContext::detached());
        assert_eq!(result.text.as_deref(), Some("graph-42"));
    }

    #[test]
    fn test_vector_operators() {
        let mut program = Program::builder();
        let a = program.constant(EvalObject::Vector(VectorObject::from_f32(&[1.0, 0.0, 0.0, 0.0])));
        let b = program.constant(EvalObject::Vector(VectorObject::from_f32(&[1.0, 0.0, 0.0, 0.0])));
        let sim = program
            .clone()
            .op(Op::push(OpArg::Vector(a)))
            .op(Op::push(OpArg::Vector(b)))
            .op(Op::bare(OpCode::Sim));
        let score = eval(sim).get_real();
        assert!((score - 1.0).abs() < 1e-3);

        let mismatched = program.op(Op::push(OpArg::Vector(a))).op(int(3)).op(Op::bare(OpCode::Dot));
        assert_eq!(eval(mismatched), StackItem::Nan);
    }

    #[test]
    fn test_hamdist_on_integers() {
        let program = Program::new(vec![
            Op::push(OpArg::Bits(0b1011)),
            Op::push(OpArg::Bits(0b0110)),
            Op::bare(OpCode::HamDist),
        ]);
        assert_eq!(eval(program), StackItem::Integer(3));
        let program = Program::new(vec![Op::push(OpArg::Real(1.0)), int(1), Op::bare(OpCode::HamDist)]);
        assert_eq!(eval(program), StackItem::Nan);
    }

    #[test]
    fn test_kernel_on_byte_strings() {
        let mut program = Program::builder();
        let a = program.constant(EvalObject::bytes(vec![1, 2, 3, 4]));
        let ssq = program.clone().op(Op::push(OpArg::Object(a))).op(Op::bare(OpCode::Kernel(Kernel::Ssq)));
        assert_eq!(eval(ssq), StackItem::Real(30.0));
        let bad = program.op(int(1)).op(Op::bare(OpCode::Kernel(Kernel::Ssq)));
        assert_eq!(eval(bad), StackItem::Real(0.0));
    }

    #[test]
    fn test_probe_array_prefix() {
        let mut program = Program::builder();
        let tokens = program.constant(EvalObject::IntArray(vec![10, 20, 30]));
        let program = program
            .op(int(0))
            .op(int(1))
            .op(Op::push(OpArg::Object(tokens)))
            .op(int(5))
            .op(Op::bare(OpCode::ProbeArray));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        vm.memory_mut().set(0, StackItem::Integer(10));
        vm.memory_mut().set(1, StackItem::Integer(20));
        assert_eq!(vm.evaluate(&mut EvalContext::detached()).value, StackItem::Integer(5));

        vm.memory_mut().set(1, StackItem::Integer(99));
        assert_eq!(vm.evaluate(&mut EvalContext::detached()).value, StackItem::ZERO);
    }
}
