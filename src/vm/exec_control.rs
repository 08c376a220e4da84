//! Stack shuffles, conditionals, jumps, membership and logic.

use crate::context::EvalContext;
use crate::core::StackItem;
use crate::ops::compare;

use super::evaluator::{Evaluator, Flow};
use super::opcode::{CmpOp, Op};

impl Evaluator {
    // ═══════════════════════════════════════════════════════════════════
    // Early Exit
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn return_if(&mut self) -> Flow {
        let v = self.stack.pop();
        if self.stack.top().condition() {
            self.set_top(v);
            return Flow::Return;
        }
        Flow::Next
    }

    pub(super) fn require(&mut self) -> Flow {
        if self.stack.top().condition() {
            return Flow::Next;
        }
        self.set_top(StackItem::ZERO);
        Flow::Return
    }

    // ═══════════════════════════════════════════════════════════════════
    // Timing Budget
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn halt(&mut self, ctx: &EvalContext<'_>) {
        let attached = match ctx.budget {
            Some(budget) => {
                budget.halt();
                true
            }
            None => false,
        };
        self.stack.push(StackItem::boolean(attached));
    }

    pub(super) fn halt_if(&mut self, ctx: &EvalContext<'_>) {
        if let (true, Some(budget)) = (self.stack.top().condition(), ctx.budget) {
            budget.halt();
        }
    }

    pub(super) fn resume(&mut self, ctx: &EvalContext<'_>) {
        let attached = match ctx.budget {
            Some(budget) => {
                budget.resume();
                true
            }
            None => false,
        };
        self.stack.push(StackItem::boolean(attached));
    }

    pub(super) fn resume_if(&mut self, ctx: &EvalContext<'_>) {
        if let (true, Some(budget)) = (self.stack.top().condition(), ctx.budget) {
            budget.resume();
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variadic Selection
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn first(&mut self, n: usize) {
        let args = self.stack.pop_n(n);
        self.stack.push(args.first().copied().unwrap_or_default());
    }

    /// First (or last) argument that is neither NONE nor NAN.
    pub(super) fn first_value(&mut self, n: usize, last: bool) {
        let args = self.stack.pop_n(n);
        let found = if last {
            args.iter().rev().find(|a| a.has_value())
        } else {
            args.iter().find(|a| a.has_value())
        };
        self.stack.push(found.copied().unwrap_or_default());
    }

    // ═══════════════════════════════════════════════════════════════════
    // Branching
    // ═══════════════════════════════════════════════════════════════════

    /// Conditional jump. The condition stays on the stack when the jump is
    /// taken so the skipped expression still has a result.
    pub(super) fn branch(&mut self, op: Op, jump_if: bool) -> Flow {
        if self.stack.top().condition() == jump_if {
            return Flow::Jump(op.nargs());
        }
        self.stack.pop();
        Flow::Next
    }

    pub(super) fn select(&mut self) {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let pick = if self.stack.top().condition() { a } else { b };
        self.set_top(pick);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Membership
    // ═══════════════════════════════════════════════════════════════════

    /// `x in container`, where the container may be a `range` or `set`
    /// marker with its operands below it.
    pub(super) fn membership(&mut self, ctx: &EvalContext<'_>, negate: bool) {
        let container = self.stack.pop();
        let found = match container {
            StackItem::Range(_) => {
                let hi = self.stack.pop();
                let lo = self.stack.pop();
                let env = op_env!(self, ctx);
                compare::in_range(&self.stack.top(), &lo, &hi, &env)
            }
            StackItem::Set(n) => {
                let members = self.stack.pop_n(n.max(0) as usize);
                let env = op_env!(self, ctx);
                compare::in_set(&self.stack.top(), &members, &env)
            }
            _ => {
                let env = op_env!(self, ctx);
                compare::element_of(&self.stack.top(), &container, &env)
            }
        };
        self.set_top(StackItem::boolean(found != negate));
    }

    // ═══════════════════════════════════════════════════════════════════
    // Comparison and Logic
    // ═══════════════════════════════════════════════════════════════════

    pub(super) fn compare(&mut self, cmp: CmpOp, ctx: &EvalContext<'_>) {
        let y = self.stack.pop();
        let x = self.stack.top();
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

    pub(super) fn logic(&mut self, f: impl Fn(bool, bool) -> bool) {
        let y = self.stack.pop();
        let x = self.stack.top();
        self.set_top(StackItem::boolean(f(x.condition(), y.condition())));
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvalConfig;
    use crate::context::{EvalContext, TimingBudget};
    use crate::core::StackItem;
    use crate::vm::{CmpOp, Evaluator, ExitStatus, Op, OpArg, OpCode, Program};

    fn int(i: i64) -> Op {
        Op::push(OpArg::Int(i))
    }

    fn eval(ops: Vec<Op>) -> StackItem {
        let mut vm = Evaluator::new(Program::new(ops), EvalConfig::default()).unwrap();
        vm.evaluate(&mut EvalContext::detached()).value
    }

    #[test]
    fn test_swap_and_dup() {
        assert_eq!(eval(vec![int(1), int(2), Op::bare(OpCode::Swap)]), StackItem::Integer(1));
        assert_eq!(
            eval(vec![int(3), Op::bare(OpCode::Dup), Op::bare(OpCode::Mul)]),
            StackItem::Integer(9)
        );
    }

    #[test]
    fn test_first_value_skips_missing() {
        let ops = vec![
            Op::push(OpArg::None),
            Op::push(OpArg::Nan),
            int(5),
            int(6),
            Op::variadic(OpCode::FirstVal, 4),
        ];
        assert_eq!(eval(ops), StackItem::Integer(5));
        let ops = vec![int(5), int(6), Op::push(OpArg::Nan), Op::variadic(OpCode::LastVal, 3)];
        assert_eq!(eval(ops), StackItem::Integer(6));
        let ops = vec![Op::push(OpArg::None), Op::variadic(OpCode::FirstVal, 1)];
        assert_eq!(eval(ops), StackItem::None);
    }

    #[test]
    fn test_conditional_jump_keeps_condition() {
        // 0 jz(4) 10 add -> condition survives as the result
        let ops = vec![int(0), Op::new(OpCode::Jz, OpArg::Int(4)), int(10), int(20)];
        assert_eq!(eval(ops), StackItem::Integer(0));
        let ops = vec![int(1), Op::new(OpCode::Jz, OpArg::Int(3)), int(10)];
        assert_eq!(eval(ops), StackItem::Integer(10));
    }

    #[test]
    fn test_if_selects() {
        let ops = vec![int(1), int(10), int(20), Op::bare(OpCode::If)];
        assert_eq!(eval(ops), StackItem::Integer(10));
        let ops = vec![int(0), int(10), int(20), Op::bare(OpCode::If)];
        assert_eq!(eval(ops), StackItem::Integer(20));
    }

    #[test]
    fn test_membership_markers() {
        let in_range = vec![int(5), int(1), int(10), Op::bare(OpCode::Range), Op::bare(OpCode::In)];
        assert_eq!(eval(in_range), StackItem::ONE);
        let at_upper = vec![int(10), int(1), int(10), Op::bare(OpCode::Range), Op::bare(OpCode::In)];
        assert_eq!(eval(at_upper), StackItem::ZERO);
        let in_set = vec![
            int(3),
            int(1),
            int(2),
            int(3),
            Op::variadic(OpCode::Set, 3),
            Op::bare(OpCode::NotIn),
        ];
        assert_eq!(eval(in_set), StackItem::ZERO);
        let bits = vec![
            Op::push(OpArg::Bits(0b0101)),
            Op::push(OpArg::Bits(0b1101)),
            Op::bare(OpCode::In),
        ];
        assert_eq!(eval(bits), StackItem::ONE);
    }

    #[test]
    fn test_require_returns_zero() {
        let mut vm = Evaluator::new(
            Program::new(vec![int(0), Op::bare(OpCode::Require), int(9)]),
            EvalConfig::default(),
        )
        .unwrap();
        let result = vm.evaluate(&mut EvalContext::detached());
        assert_eq!(result.value, StackItem::ZERO);
        assert_eq!(result.status, ExitStatus::Returned);
    }

    #[test]
    fn test_return_if() {
        let ops = vec![int(1), int(42), Op::bare(OpCode::ReturnIf), int(7)];
        assert_eq!(eval(ops), StackItem::Integer(42));
        let ops = vec![int(0), int(42), Op::bare(OpCode::ReturnIf), int(7), Op::bare(OpCode::Add)];
        assert_eq!(eval(ops), StackItem::Integer(7));
    }

    #[test]
    fn test_compare_and_logic() {
        let ops = vec![int(2), Op::push(OpArg::Real(2.0)), Op::bare(OpCode::Compare(CmpOp::Eq))];
        assert_eq!(eval(ops), StackItem::ONE);
        let ops = vec![int(2), int(3), Op::bare(OpCode::Compare(CmpOp::Gt))];
        assert_eq!(eval(ops), StackItem::ZERO);
        let ops = vec![int(1), Op::push(OpArg::Nan), Op::bare(OpCode::Or)];
        assert_eq!(eval(ops), StackItem::ONE);
        let ops = vec![int(1), int(1), Op::bare(OpCode::Xor)];
        assert_eq!(eval(ops), StackItem::ZERO);
    }

    #[test]
    fn test_continue_clears_halt() {
        let budget = TimingBudget::new();
        budget.halt();
        let config = EvalConfig { check_halt: false, ..EvalConfig::default() };
        let program = Program::new(vec![Op::bare(OpCode::Continue), Op::bare(OpCode::Halted)]);
        let mut vm = Evaluator::new(program, config).unwrap();
        let result = vm.evaluate(&mut EvalContext::detached().with_budget(&budget));
        assert_eq!(result.value, StackItem::ZERO);
        assert!(!budget.is_halted());
    }
}
