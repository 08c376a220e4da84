//! Integration tests for evaluation during a graph traversal.
//!
//! Component: Evaluator + EvalContext + Collector
//!
//! These tests verify:
//! - Vertex loads, properties and rank through a `GraphView`
//! - Vector similarity scoring and top-k culling
//! - Arc-group decay and filters across a multi-arc
//! - Staging and committing results into a collector

#![cfg(test)]

use crate::common::*;

use vxeval::core::ArcDir;
use vxeval::decay::DecayKind;
use vxeval::vm::{ArcField, ArcSide, CmpOp, Constant, VertexField};
use vxeval::*;

fn this(g: &StaticGraph, v: u64) -> EvalContext<'_> {
    EvalContext::new(Some(g)).with_vertices(None, Some(VertexRef(v)), None)
}

// =============================================================================
// Vertex Loads
// =============================================================================

mod vertex_loads {
    use super::*;

    #[test]
    fn recent_documents_pass_filter() {
        // Arrange: vertex['year'] >= 2021
        let g = corpus();
        let program = Program::new(vec![
            int(property_key("year")),
            var(OpCode::Property(Role::This), 1),
            int(2021),
            op(OpCode::Compare(CmpOp::Gte)),
        ]);
        let mut vm = bind(program);

        // Act
        let passed: Vec<u64> = (0..5).filter(|&v| vm.evaluate(&mut this(&g, v)).passed()).collect();

        // Assert
        assert_eq!(passed, vec![1, 2, 4]);
    }

    #[test]
    fn text_property_is_copied_out() {
        let g = corpus();
        let mut program = Program::builder();
        let title = program.string("title");
        let program = program.op(Op::push(title)).op(var(OpCode::Property(Role::This), 1));
        let result = bind(program).evaluate(&mut this(&g, 2));
        assert_eq!(result.text.as_deref(), Some("RESULTS"));
    }

    #[test]
    fn missing_property_uses_context_default() {
        let g = corpus();
        let program = Program::new(vec![int(property_key("pages")), var(OpCode::Property(Role::This), 1)]);
        let mut ctx = this(&g, 0).with_default_property(StackItem::Integer(-1));
        assert_eq!(bind(program).evaluate(&mut ctx).value, StackItem::Integer(-1));
    }

    #[test]
    fn graph_order_and_age() {
        let g = corpus();
        let mut vm = bind(Program::new(vec![op(OpCode::Const(Constant::Order))]));
        assert_eq!(vm.evaluate(&mut this(&g, 0)).value, StackItem::Integer(5));

        let mut vm = bind(Program::new(vec![op(OpCode::Const(Constant::Age))]));
        let mut ctx = this(&g, 0).with_time(1000.0, 1250.0);
        assert_real(vm.evaluate(&mut ctx).value, 250.0, 0.0);
    }

    #[test]
    fn relationship_names_round_trip() {
        // Arrange
        let g = corpus();
        let mut program = Program::builder();
        let mentions = program.string("mentions");
        let program = program.op(Op::push(mentions)).op(op(OpCode::RelEnc));
        let decode = Program::new(vec![int(1), op(OpCode::RelDec)]);

        // Act
        let code = bind(program).evaluate(&mut this(&g, 0)).value;
        let name = bind(decode).evaluate(&mut this(&g, 0));

        // Assert
        assert_eq!(code, StackItem::Integer(2));
        assert_eq!(name.text.as_deref(), Some("cites"));
    }

    #[test]
    fn loads_without_vertex_are_none() {
        let g = corpus();
        let program = Program::new(vec![op(OpCode::Vertex(Role::Head, VertexField::Degree))]);
        assert!(bind(program).evaluate(&mut this(&g, 0)).value.is_none());
    }
}

// =============================================================================
// Similarity and Culling
// =============================================================================

mod similarity {
    use super::*;

    /// `rank(sim(vertex.vector, query))` fed to the cull heap.
    fn scoring_program(query: &[f32], k: usize) -> Program {
        let mut program = Program::builder();
        let query = program.constant(EvalObject::Vector(VectorObject::from_f32(query)));
        program
            .op(op(OpCode::Vertex(Role::This, VertexField::Vector)))
            .op(Op::push(OpArg::Vector(query)))
            .op(op(OpCode::Sim))
            .op(var(OpCode::Rank, 1))
            .op(int(k as i64))
            .op(op(OpCode::MCull))
            .with_cull(k)
    }

    #[test]
    fn cull_keeps_best_ranked_documents() {
        // Arrange
        let g = corpus();
        let mut vm = bind(scoring_program(&[1.0, 0.0, 0.0, 0.0], 2));

        // Act
        for v in 0..5 {
            vm.evaluate(&mut this(&g, v));
        }

        // Assert: survey scores 1.2 * ~0.86, intro 1.0 * ~0.99
        let kept: Vec<VertexRef> = vm.culled().iter().filter_map(|h| h.vertex).collect();
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&VertexRef(0)));
        assert!(kept.contains(&VertexRef(4)));
    }

    #[test]
    fn reset_cull_starts_new_query() {
        let g = corpus();
        let mut vm = bind(scoring_program(&[0.0, 0.0, 0.0, 1.0], 1));
        for v in 0..5 {
            vm.evaluate(&mut this(&g, v));
        }
        assert_eq!(vm.culled()[0].vertex, Some(VertexRef(3)));

        vm.reset_cull();
        assert!(vm.culled().is_empty());
    }
}

// =============================================================================
// Arc Groups
// =============================================================================

mod arc_groups {
    use super::*;

    fn synthetic() -> Predicator {
        Predicator::new(Predicator::REL_SYNTHETIC, ArcDir::Out, Predicator::MOD_STATIC, 0)
    }

    /// Run `program` over raw arcs, then the synthetic arc closing the group.
    fn over_group(vm: &mut Evaluator, arcs: &[Predicator], tnow: f64) -> StackItem {
        let mut ctx = EvalContext::detached().with_time(0.0, tnow);
        for &arc in arcs {
            ctx.exit = arc;
            assert!(vm.evaluate(&mut ctx).value.is_none());
        }
        ctx.exit = synthetic();
        vm.evaluate(&mut ctx).value
    }

    #[test]
    fn exponential_decay_over_lifetime() {
        // Arrange: value 8 created at 100, expiring at 200
        let arcs = [
            Predicator::new(1, ArcDir::Out, Predicator::MOD_TIME_CREATED, 100),
            Predicator::new(1, ArcDir::Out, Predicator::MOD_TIME_EXPIRES, 200),
            Predicator::with_float(1, ArcDir::Out, Predicator::MOD_FLOAT, 8.0),
            Predicator::with_float(2, ArcDir::Out, Predicator::MOD_FLOAT, 50.0),
        ];
        let mut vm = bind(Program::new(vec![int(1), var(OpCode::ArcDecay(DecayKind::Exponential), 1)]));

        // Act
        let at_creation = over_group(&mut vm, &arcs, 100.0);
        let at_expiry = over_group(&mut vm, &arcs, 200.0);

        // Assert
        assert_real(at_creation, 8.0, 1e-6);
        assert_real(at_expiry, 0.0, 1e-2);
    }

    #[test]
    fn decayed_relationship_replaces_synthetic_exit() {
        // Arrange: decay rel 7, then read the exit arc's relationship
        let mut vm = bind(Program::new(vec![
            int(7),
            var(OpCode::ArcDecay(DecayKind::Linear), 1),
            op(OpCode::Pop),
            op(OpCode::Arc(ArcSide::Exit, ArcField::RelCode)),
        ]));
        let mut ctx = EvalContext::detached().with_time(0.0, 10.0);
        ctx.exit = Predicator::with_float(7, ArcDir::Out, Predicator::MOD_FLOAT, 3.0);
        vm.evaluate(&mut ctx);

        // Act
        ctx.exit = synthetic();
        let rel = vm.evaluate(&mut ctx).value;

        // Assert
        assert_eq!(rel, StackItem::Integer(7));
        assert!(!ctx.exit.is_synthetic());
    }

    #[test]
    fn unmatched_group_decays_to_none() {
        let arcs = [Predicator::with_float(2, ArcDir::Out, Predicator::MOD_FLOAT, 1.0)];
        let mut vm = bind(Program::new(vec![int(1), var(OpCode::ArcDecay(DecayKind::Linear), 1)]));
        assert!(over_group(&mut vm, &arcs, 10.0).is_none());
    }

    #[test]
    fn hasrel_reports_each_relationship() {
        // Arrange: does the group contain rel 1? rel 2? rel 3?
        let arcs = [
            Predicator::new(3, ArcDir::Out, Predicator::MOD_STATIC, 0),
            Predicator::new(1, ArcDir::Out, Predicator::MOD_STATIC, 0),
        ];
        let mut vm = bind(Program::new(vec![int(1), int(2), int(3), var(OpCode::HasRel, 3)]));

        // Act & Assert: rightmost argument is bit 0
        assert_eq!(over_group(&mut vm, &arcs, 0.0), StackItem::Bitvector(0b101));
    }

    #[test]
    fn hasrelmod_matches_pairs() {
        let arcs = [Predicator::new(2, ArcDir::Out, Predicator::MOD_COUNTER, 4)];
        let ops = vec![
            int(2),
            int(Predicator::MOD_COUNTER as i64),
            int(2),
            int(Predicator::MOD_FLOAT as i64),
            var(OpCode::HasRelMod, 4),
        ];
        let mut vm = bind(Program::new(ops));
        assert_eq!(over_group(&mut vm, &arcs, 0.0), StackItem::Bitvector(0b10));
    }

    #[test]
    fn arcvalue_extracts_matching_value() {
        let arcs = [
            Predicator::new(1, ArcDir::Out, Predicator::MOD_INTEGER, (-5i32) as u32),
            Predicator::with_float(2, ArcDir::Out, Predicator::MOD_FLOAT, 0.25),
        ];
        let mut vm = bind(Program::new(vec![int(2), int(0), op(OpCode::ArcValue)]));
        assert_real(over_group(&mut vm, &arcs, 0.0), 0.25, 0.0);

        let mut vm = bind(Program::new(vec![int(0), int(Predicator::MOD_INTEGER as i64), op(OpCode::ArcValue)]));
        assert_eq!(over_group(&mut vm, &arcs, 0.0), StackItem::Integer(-5));
    }
}

// =============================================================================
// Collection
// =============================================================================

mod collection {
    use super::*;

    fn cites(weight: f32) -> Predicator {
        Predicator::with_float(1, ArcDir::Out, Predicator::MOD_FLOAT, weight)
    }

    #[test]
    fn stage_then_commit_on_second_condition() {
        // Arrange: stage every arc into slot 0 with its year, commit when weight > 0.5
        let g = corpus();
        let mut collector = ResultCollector::new(CollectorKind::Arc, 8);
        let mut stage = bind(Program::new(vec![
            int(property_key("year")),
            var(OpCode::Property(Role::This), 1),
            int(0),
            var(OpCode::Stage, 2),
        ]));
        let mut commit = bind(Program::new(vec![
            op(OpCode::Arc(ArcSide::Arrive, ArcField::Value)),
            real(0.5),
            op(OpCode::Compare(CmpOp::Gt)),
            int(0),
            var(OpCode::CommitIf, 2),
        ]));

        // Act
        {
            let mut ctx = EvalContext::new(Some(&g)).with_collector(&mut collector);
            for (head, weight) in [(1, 0.9), (2, 0.2), (4, 0.6)] {
                ctx.advance(Some(VertexRef(0)), Some(VertexRef(head)), cites(weight));
                assert_eq!(stage.evaluate(&mut ctx).value, StackItem::ONE);
                commit.evaluate(&mut ctx);
            }
        }

        // Assert
        let results = collector.results();
        let heads: Vec<VertexRef> = results.iter().map(|r| r.head).collect();
        assert_eq!(heads, vec![VertexRef(1), VertexRef(4)]);
        assert_eq!(results[0].predicator.value(), StackItem::Integer(2021));
        assert_eq!(results[1].predicator.value(), StackItem::Integer(2023));
    }

    #[test]
    fn read_only_collector_refuses() {
        let g = corpus();
        let mut collector = ResultCollector::new(CollectorKind::Vertex, 8).read_only();
        {
            let mut ctx = EvalContext::new(Some(&g)).with_collector(&mut collector);
            ctx.advance(Some(VertexRef(0)), Some(VertexRef(1)), cites(1.0));
            let result = bind(Program::new(vec![var(OpCode::Collect, 0)])).evaluate(&mut ctx);
            assert_eq!(result.value, StackItem::ZERO);
        }
        assert!(collector.is_empty());
    }

    #[test]
    fn collectable_floor_tracks_weakest() {
        let g = corpus();
        let mut collector = ResultCollector::new(CollectorKind::Arc, 2).sorted();
        {
            let mut ctx = EvalContext::new(Some(&g)).with_collector(&mut collector);
            let mut collect = bind(Program::new(vec![var(OpCode::Collect, 0)]));
            let mut floor = bind(Program::new(vec![op(OpCode::CollectableReal)]));

            ctx.advance(Some(VertexRef(0)), Some(VertexRef(1)), cites(0.5));
            collect.evaluate(&mut ctx);
            assert_eq!(floor.evaluate(&mut ctx).value, StackItem::Real(0.0));

            ctx.advance(Some(VertexRef(0)), Some(VertexRef(2)), cites(0.75));
            collect.evaluate(&mut ctx);
            assert_eq!(floor.evaluate(&mut ctx).value, StackItem::Real(0.5));
        }
        assert_eq!(collector.len(), 2);
    }
}
