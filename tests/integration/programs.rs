//! Integration tests for programs that run without a graph.
//!
//! Component: Evaluator
//!
//! These tests verify:
//! - Stack shuffles, conditionals and membership
//! - Degradation instead of failure on bad operands
//! - Memory bank programs: counters, slices, reductions, sorting, heaps
//! - Exit statuses

#![cfg(test)]

use crate::common::*;

use vxeval::vm::{Addr, CmpOp, Extreme, MemOp, Reduce};
use vxeval::*;

// =============================================================================
// Stack and Control
// =============================================================================

mod stack_and_control {
    use super::*;

    #[test]
    fn select_picks_branch() {
        // Arrange & Act
        let yes = value(vec![int(1), int(10), int(20), op(OpCode::If)]);
        let no = value(vec![int(0), int(10), int(20), op(OpCode::If)]);

        // Assert
        assert_eq!(yes, StackItem::Integer(10));
        assert_eq!(no, StackItem::Integer(20));
    }

    #[test]
    fn range_membership() {
        let inside = value(vec![int(5), int(1), int(9), op(OpCode::Range), op(OpCode::In)]);
        let outside = value(vec![real(9.5), int(1), int(9), op(OpCode::Range), op(OpCode::In)]);
        let negated = value(vec![real(9.5), int(1), int(9), op(OpCode::Range), op(OpCode::NotIn)]);

        assert_eq!(inside, StackItem::ONE);
        assert_eq!(outside, StackItem::ZERO);
        assert_eq!(negated, StackItem::ONE);
    }

    #[test]
    fn set_membership() {
        let ops = vec![int(4), int(2), int(4), int(8), var(OpCode::Set, 3), op(OpCode::In)];
        assert_eq!(value(ops), StackItem::ONE);
    }

    #[test]
    fn firstval_skips_missing() {
        let ops = vec![op(OpCode::Push), Op::push(OpArg::Nan), int(3), int(4), var(OpCode::FirstVal, 4)];
        assert_eq!(value(ops), StackItem::Integer(3));
    }

    #[test]
    fn require_ends_early() {
        // Arrange
        let ops = vec![int(0), op(OpCode::Require), int(99)];

        // Act
        let result = run(ops);

        // Assert
        assert_eq!(result.status, ExitStatus::Returned);
        assert_eq!(result.value, StackItem::ZERO);
    }

    #[test]
    fn division_by_zero_uses_smallest_divisor() {
        let result = run(vec![int(1), int(0), op(OpCode::Div)]);
        assert_eq!(result.status, ExitStatus::Completed);
        assert_eq!(result.value, StackItem::Real(1.0 / f32::MIN_POSITIVE as f64));
    }

    #[test]
    fn comparison_mixes_numeric_types() {
        assert_eq!(value(vec![int(2), real(2.0), op(OpCode::Compare(CmpOp::Eq))]), StackItem::ONE);
        assert_eq!(value(vec![int(2), real(2.5), op(OpCode::Compare(CmpOp::Lt))]), StackItem::ONE);
    }

    #[test]
    fn geo_scorers_take_lat_lon_pairs() {
        // Arrange: Oslo to Stockholm
        let trip = [real(59.9139), real(10.7522), real(59.3293), real(18.0686)];

        // Act
        let mut dist = trip.to_vec();
        dist.push(op(OpCode::HavDist));
        let mut near = trip.to_vec();
        near.push(op(OpCode::GeoProx));
        let meters = value(dist).raw_real();
        let score = value(near).raw_real();

        // Assert
        assert!((meters - 416_298.6).abs() < 1.0, "oslo-stockholm {meters}");
        assert!(score > 0.98 && score < 1.0);
        assert_eq!(value(vec![int(0), int(0), int(0), int(0), op(OpCode::GeoProx)]), StackItem::Real(1.0));
    }
}

// =============================================================================
// Memory Bank
// =============================================================================

mod memory_bank {
    use super::*;

    #[test]
    fn counter_survives_evaluations() {
        // Arrange
        let mut vm = bind(Program::new(vec![int(7), op(OpCode::Inc(Addr::Direct))]));
        vm.memory_mut().set(7, StackItem::Integer(100));

        // Act
        let results: Vec<StackItem> = (0..3).map(|_| vm.evaluate(&mut EvalContext::detached()).value).collect();

        // Assert
        assert_eq!(results.last(), Some(&StackItem::Integer(103)));
        assert_eq!(vm.memory().get(7), StackItem::Integer(103));
    }

    #[test]
    fn addresses_wrap_around_bank() {
        // Default bank has 1024 cells.
        let mut ops = vec![int(1024 + 3), int(42), op(OpCode::Store(Addr::Direct)), op(OpCode::Pop)];
        ops.extend([int(3), op(OpCode::Load(Addr::Direct))]);
        assert_eq!(value(ops), StackItem::Integer(42));
    }

    #[test]
    fn mean_of_mixed_slice() {
        // Arrange
        let mut ops = fill(0, &[int(1), real(2.0), int(6), op(OpCode::Push)]);

        // Act
        ops.extend([int(20), int(0), int(3), op(OpCode::MReduce { kind: Reduce::Mean, raw: false })]);

        // Assert
        assert_eq!(value(ops), StackItem::Real(3.0));
    }

    #[test]
    fn scale_then_find_maximum() {
        let mut ops = fill(0, &[int(3), real(0.5), int(2)]);
        ops.extend([int(0), int(2), int(4), op(OpCode::MScalar(MemOp::Mul)), op(OpCode::Pop)]);
        ops.extend([int(20), int(0), int(2), op(OpCode::MExtreme(Extreme::Max))]);

        let mut vm = bind(Program::new(ops));
        let result = vm.evaluate(&mut EvalContext::detached());

        // The index of the maximum is returned, the value lands in cell 20.
        assert_eq!(result.value, StackItem::Integer(0));
        assert_eq!(vm.memory().get(20), StackItem::Integer(12));
    }

    #[test]
    fn descending_sort() {
        let mut ops = fill(0, &[int(2), int(9), real(4.5)]);
        ops.extend([int(0), int(3), op(OpCode::MSort { raw: false, reverse: true })]);

        let mut vm = bind(Program::new(ops));
        vm.evaluate(&mut EvalContext::detached());

        let cells = &vm.memory().cells()[0..3];
        assert_eq!(cells, &[StackItem::Integer(9), StackItem::Real(4.5), StackItem::Integer(2)]);
    }

    #[test]
    fn heap_retains_largest_scores() {
        // Arrange: a 3-slot min-heap at cell 0
        let mut ops = vec![int(0), int(3), op(OpCode::MHeapInit), op(OpCode::Pop)];
        ops.extend([int(0), int(3)]);
        ops.extend([5, 1, 8, 3, 9, 2].map(int));

        // Act
        ops.push(var(OpCode::MHeapWrite(vxeval::Polarity::Min), 8));
        let mut vm = bind(Program::new(ops));
        vm.evaluate(&mut EvalContext::detached());

        // Assert
        let mut kept: Vec<i64> = vm.memory().cells()[0..3].iter().map(|c| c.raw_integer()).collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![5, 8, 9]);
    }

    #[test]
    fn run_past_bank_end_is_ignored() {
        // Arrange: a run whose end overflows i64
        let write = vec![int(1), int(i64::MAX), int(7), int(3), var(OpCode::MHeapWrite(vxeval::Polarity::Min), 4)];

        // Act
        let mut vm = bind(Program::new(write));
        let result = vm.evaluate(&mut EvalContext::detached());

        // Assert
        assert_eq!(result.value, StackItem::ZERO);
        assert!(vm.memory().cells().iter().all(|c| *c == StackItem::ZERO));
        assert_eq!(value(vec![int(1), int(i64::MAX), op(OpCode::MHeapInit)]), StackItem::ZERO);
    }
}

// =============================================================================
// Exit Status
// =============================================================================

mod exit_status {
    use super::*;

    #[test]
    fn limit_stops_runaway_program() {
        let program = Program::new(vec![int(1); 10]).with_limit(4);
        let result = bind(program).evaluate(&mut EvalContext::detached());
        assert_eq!(result.status, ExitStatus::Limited);
        assert_eq!(result.ops, 4);
    }

    #[test]
    fn halt_is_observed_after_op() {
        // Arrange
        let budget = TimingBudget::new();
        budget.halt();
        let mut vm = bind(Program::new(vec![int(1), int(2), op(OpCode::Add)]));

        // Act
        let result = vm.evaluate(&mut EvalContext::detached().with_budget(&budget));

        // Assert
        assert_eq!(result.status, ExitStatus::Halted);
        assert_eq!(result.ops, 1);
    }

    #[test]
    fn passthru_trailer_is_skipped_by_return() {
        let program = Program::new(vec![int(5), op(OpCode::Return), int(6)]).with_passthru(1);
        let result = bind(program).evaluate(&mut EvalContext::detached());
        assert_eq!(result.value, StackItem::Integer(5));
        assert_eq!(result.status, ExitStatus::Returned);
    }
}
