//! Determinism tests for the evaluator.
//!
//! These tests verify that a bound program produces identical results for
//! identical inputs across repeated evaluations, across evaluators built
//! from the same configuration, and across batch and sequential runs.

#[cfg(test)]
mod tests {
    use crate::core::ArcDir;
    use crate::decay::DecayKind;
    use crate::*;

    fn int(i: i64) -> Op {
        Op::push(OpArg::Int(i))
    }

    /// Run a program several times against a fresh detached context and
    /// verify every evaluation matches the first.
    fn verify_repeatable(program: Program, runs: usize) -> Evaluation {
        let mut vm = Evaluator::new(program, EvalConfig::default()).expect("bind failed");
        let first = vm.evaluate(&mut EvalContext::detached());
        for run in 1..runs {
            let again = vm.evaluate(&mut EvalContext::detached());
            assert_eq!(again, first, "run {run} diverged");
        }
        first
    }

    #[test]
    fn test_arithmetic_is_repeatable() {
        let program = Program::new(vec![
            int(7),
            Op::push(OpArg::Real(2.5)),
            Op::bare(OpCode::Mul),
            int(3),
            Op::bare(OpCode::Sub),
        ]);
        let result = verify_repeatable(program, 20);
        assert_eq!(result.value, StackItem::Real(14.5));
    }

    #[test]
    fn test_string_scope_resets_between_runs() {
        let mut program = Program::builder();
        let a = program.string("ab");
        let b = program.string("cd");
        let program = program
            .op(Op::push(a))
            .op(Op::push(b))
            .op(Op::bare(OpCode::Add))
            .op(Op::push(b))
            .op(Op::bare(OpCode::Add));
        let config = EvalConfig { object_budget: 4, ..EvalConfig::default() };
        let mut vm = Evaluator::new(program, config).unwrap();
        // Far more runs than the budget allows objects; each run starts empty.
        for _ in 0..100 {
            let result = vm.evaluate(&mut EvalContext::detached());
            assert_eq!(result.text.as_deref(), Some("abcdcd"));
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let program = || Program::new(vec![Op::bare(OpCode::RandomBits)]);
        let mut a = Evaluator::new(program(), EvalConfig::default()).unwrap();
        let mut b = Evaluator::new(program(), EvalConfig::default()).unwrap();
        let stream = |vm: &mut Evaluator| -> Vec<StackItem> {
            (0..16).map(|_| vm.evaluate(&mut EvalContext::detached()).value).collect()
        };
        let first = stream(&mut a);
        assert_eq!(first, stream(&mut b));

        let config = EvalConfig { random_seed: 0xfeed, ..EvalConfig::default() };
        let mut c = Evaluator::new(program(), config).unwrap();
        assert_ne!(first, stream(&mut c));
    }

    #[test]
    fn test_bank_persists_until_reset() {
        let program = Program::new(vec![int(5), Op::bare(OpCode::Inc(vm::Addr::Direct))]);
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        vm.memory_mut().set(5, StackItem::ZERO);
        let counts: Vec<StackItem> = (0..3).map(|_| vm.evaluate(&mut EvalContext::detached()).value).collect();
        assert_eq!(counts, vec![StackItem::Integer(1), StackItem::Integer(2), StackItem::Integer(3)]);
        vm.reset_memory();
        assert!(vm.evaluate(&mut EvalContext::detached()).value.is_none());
    }

    #[test]
    fn test_arc_group_restarts_after_reset() {
        let program = Program::new(vec![int(3), Op::variadic(OpCode::ArcDecay(DecayKind::Exponential), 1)]);
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        let raw = Predicator::with_float(3, ArcDir::Out, Predicator::MOD_FLOAT, 1.5);
        let end = Predicator::new(Predicator::REL_SYNTHETIC, ArcDir::Out, Predicator::MOD_STATIC, 0);

        let group = |vm: &mut Evaluator| {
            let mut ctx = EvalContext::detached().with_arcs(Predicator::NONE, raw).with_time(10.0, 10.0);
            vm.evaluate(&mut ctx);
            ctx.exit = end;
            vm.evaluate(&mut ctx).value
        };
        let first = group(&mut vm);
        assert_eq!(first, StackItem::Real(1.5));
        assert_eq!(group(&mut vm), first);

        // A half-folded group is discarded by the reset.
        let mut ctx = EvalContext::detached().with_arcs(Predicator::NONE, raw);
        vm.evaluate(&mut ctx);
        vm.reset_registers();
        assert_eq!(group(&mut vm), first);
    }

    #[test]
    fn test_batch_equals_sequential() {
        let mut g = StaticGraph::new();
        for i in 0..32 {
            g.add_vertex(VertexRecord::new(format!("v{i}")).with_degree(i, 32 - i));
        }
        let program = Program::new(vec![
            Op::bare(OpCode::Vertex(Role::This, vm::VertexField::InDegree)),
            Op::bare(OpCode::Vertex(Role::This, vm::VertexField::OutDegree)),
            Op::bare(OpCode::Mul),
        ]);
        let mut vm = Evaluator::new(program.clone(), EvalConfig::default()).unwrap();
        let sequential: Vec<StackItem> = (0..32)
            .map(|i| {
                let mut ctx = EvalContext::new(Some(&g)).with_vertices(None, Some(VertexRef(i)), None);
                vm.evaluate(&mut ctx).value
            })
            .collect();

        let mut contexts: Vec<EvalContext<'_>> = (0..32)
            .map(|i| EvalContext::new(Some(&g)).with_vertices(None, Some(VertexRef(i)), None))
            .collect();
        let batch: Vec<StackItem> = evaluate_batch(program, EvalConfig::default(), &mut contexts)
            .unwrap()
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(batch, sequential);
        assert_eq!(batch[4], StackItem::Integer(4 * 28));
    }
}
