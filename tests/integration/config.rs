//! Integration tests for configuration and program binding.
//!
//! Component: EvalConfig + Evaluator::new
//!
//! These tests verify:
//! - Configuration documents load with defaults for missing fields
//! - Presets bound what a program may ask for
//! - Binding rejects malformed programs with categorized errors
//! - Runtime switches (halt polling, kernel selection) take effect

#![cfg(test)]

use crate::common::*;

use vxeval::vm::{Addr, VertexField};
use vxeval::*;

/// `n` pushes consumed by one variadic `do`: static depth `n`.
fn deep(n: usize) -> Program {
    let mut ops: Vec<Op> = (0..n as i64).map(int).collect();
    ops.push(var(OpCode::Do, n as i64));
    Program::new(ops)
}

// =============================================================================
// Loading
// =============================================================================

mod loading {
    use super::*;

    #[test]
    fn host_document_overrides_named_fields() {
        // Arrange
        let text = r#"{ "memory_order": 12, "check_halt": false, "random_seed": 7 }"#;

        // Act
        let config = EvalConfig::from_json(text).unwrap();

        // Assert
        assert_eq!(config.memory_order, 12);
        assert!(!config.check_halt);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.stack_capacity, EvalConfig::default().stack_capacity);
        assert_eq!(config.simd, SimdMode::Auto);
    }

    #[test]
    fn saved_config_reloads_identically() {
        let config = EvalConfig { simd: SimdMode::Scalar, max_cull: 16, ..EvalConfig::strict() };
        let reloaded = EvalConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn unknown_simd_mode_is_parse_error() {
        let err = EvalConfig::from_json(r#"{ "simd": "mmx" }"#).unwrap_err();
        assert!(matches!(err, EvalError::Json(_)));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn out_of_range_order_is_resource_error() {
        let err = EvalConfig::from_json(r#"{ "memory_order": 1 }"#).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert!(err.to_string().contains("invalid memory order 1"));
    }
}

// =============================================================================
// Binding
// =============================================================================

mod binding {
    use super::*;

    #[test]
    fn deep_program_needs_permissive_stack() {
        // Arrange
        let program = deep(512);

        // Act
        let strict = Evaluator::new(program.clone(), EvalConfig::strict());
        let permissive = Evaluator::new(program, EvalConfig::permissive());

        // Assert
        let err = strict.err().expect("strict stack is too small");
        assert!(matches!(err, EvalError::StackOverflow { depth: 512, capacity: 256 }));
        assert!(permissive.is_ok());
    }

    #[test]
    fn cull_request_bounded_by_config() {
        let program = Program::new(vec![int(1)]).with_cull(2048);
        let err = Evaluator::new(program.clone(), EvalConfig::strict()).err().unwrap();
        assert!(matches!(err, EvalError::InvalidCullCapacity { requested: 2048, max: 1024 }));
        assert!(err.is_recoverable());
        assert!(Evaluator::new(program, EvalConfig::default()).is_ok());
    }

    #[test]
    fn program_memory_order_overrides_config() {
        let vm = bind(Program::new(vec![int(1)]).with_memory_order(4));
        assert_eq!(vm.memory().len(), 16);

        let vm = bind(Program::new(vec![int(1)]));
        assert_eq!(vm.memory().len(), 1 << EvalConfig::default().memory_order);
    }

    #[test]
    fn malformed_programs_rejected() {
        let cases = [
            Program::new(vec![]),
            Program::new(vec![int(1), Op::new(OpCode::Jump, OpArg::Int(0))]),
            Program::new(vec![int(1), Op::new(OpCode::Jump, OpArg::Int(9))]),
            Program::new(vec![int(1), var(OpCode::Do, -1)]),
            Program::new(vec![int(1)]).with_passthru(3),
        ];
        for program in cases {
            let err = Evaluator::new(program, EvalConfig::default()).err().unwrap();
            assert_eq!(err.category(), ErrorCategory::Program, "{err}");
        }
    }

    #[test]
    fn rebind_starts_fresh_bank() {
        let mut vm = bind(Program::new(vec![int(3), op(OpCode::Load(Addr::Direct))]));
        vm.memory_mut().set(3, StackItem::Integer(9));
        assert_eq!(vm.evaluate(&mut EvalContext::detached()).value, StackItem::Integer(9));

        vm.rebind(Program::new(vec![int(3), op(OpCode::Load(Addr::Direct))])).unwrap();
        assert!(vm.evaluate(&mut EvalContext::detached()).value.is_none());
    }
}

// =============================================================================
// Runtime Switches
// =============================================================================

mod switches {
    use super::*;

    #[test]
    fn halt_polling_can_be_disabled() {
        // Arrange
        let budget = TimingBudget::new();
        budget.halt();
        let program = Program::new(vec![int(1), int(2), op(OpCode::Add)]);
        let config = EvalConfig { check_halt: false, ..EvalConfig::default() };
        let mut vm = Evaluator::new(program, config).unwrap();

        // Act
        let result = vm.evaluate(&mut EvalContext::detached().with_budget(&budget));

        // Assert
        assert_eq!(result.status, ExitStatus::Completed);
        assert_eq!(result.value, StackItem::Integer(3));
    }

    #[test]
    fn scalar_kernels_agree_with_detected() {
        let g = corpus();
        let program = || {
            let mut program = Program::builder();
            let query = program.constant(EvalObject::Vector(VectorObject::from_f32(&[0.5, 0.5, 0.5, 0.5])));
            program
                .op(op(OpCode::Vertex(Role::This, VertexField::Vector)))
                .op(Op::push(OpArg::Vector(query)))
                .op(op(OpCode::Sim))
        };
        let mut auto = bind(program());
        let scalar = EvalConfig { simd: SimdMode::Scalar, ..EvalConfig::default() };
        let mut scalar = Evaluator::new(program(), scalar).unwrap();

        for v in 0..5 {
            let mut ctx = EvalContext::new(Some(&g)).with_vertices(None, Some(VertexRef(v)), None);
            let a = auto.evaluate(&mut ctx).real();
            let b = scalar.evaluate(&mut ctx).real();
            assert!((a - b).abs() < 1e-5, "vertex {v}: {a} vs {b}");
        }
    }
}
