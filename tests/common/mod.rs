//! Shared test utilities for vxeval integration tests.
//!
//! This module provides:
//! - Operation and program builders
//! - Evaluation helpers
//! - Graph fixtures
//! - Log capture through `RUST_LOG`
//!
//! ## AAA Pattern
//!
//! All tests follow the Arrange-Act-Assert pattern:
//! - Arrange: Set up the graph, program and context
//! - Act: Evaluate the program
//! - Assert: Verify the result item and side effects

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use vxeval::vm::Addr;
use vxeval::*;

// =============================================================================
// Logging
// =============================================================================

static TRACING: Once = Once::new();

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

// =============================================================================
// Operation Builders
// =============================================================================

pub fn int(i: i64) -> Op {
    Op::push(OpArg::Int(i))
}

pub fn real(r: f64) -> Op {
    Op::push(OpArg::Real(r))
}

pub fn op(code: OpCode) -> Op {
    Op::bare(code)
}

pub fn var(code: OpCode, n: i64) -> Op {
    Op::variadic(code, n)
}

/// Ops writing `values` to consecutive cells starting at `at`, leaving
/// the stack as it was.
pub fn fill(at: i64, values: &[Op]) -> Vec<Op> {
    let mut ops = vec![int(at)];
    ops.extend_from_slice(values);
    ops.push(var(OpCode::Write(Addr::Direct), values.len() as i64 + 1));
    ops.push(op(OpCode::Pop));
    ops
}

// =============================================================================
// Evaluation Helpers
// =============================================================================

/// Bind `program` with the default configuration.
///
/// # Panics
/// Panics if binding fails, which is appropriate for test code.
pub fn bind(program: Program) -> Evaluator {
    init_tracing();
    Evaluator::new(program, EvalConfig::default()).expect("Failed to bind program")
}

/// Run a program once without a graph.
pub fn run(ops: Vec<Op>) -> Evaluation {
    bind(Program::new(ops)).evaluate(&mut EvalContext::detached())
}

/// Run a program once and return its result item.
pub fn value(ops: Vec<Op>) -> StackItem {
    run(ops).value
}

/// Assert a real result within `eps`.
pub fn assert_real(item: StackItem, expected: f64, eps: f64) {
    match item {
        StackItem::Real(r) => assert!((r - expected).abs() <= eps, "expected {expected}, got {r}"),
        other => panic!("expected REAL {expected}, got {other:?}"),
    }
}

// =============================================================================
// Graph Fixtures
// =============================================================================

/// Five documents with embeddings, ranks and a few properties.
///
/// Relationship `cites` is code 1, `mentions` code 2.
pub fn corpus() -> StaticGraph {
    let mut g = StaticGraph::new();
    let docs: [(&str, [f32; 4], i64, f32); 5] = [
        ("intro", [0.9, 0.1, 0.0, 0.0], 2019, 1.0),
        ("methods", [0.1, 0.9, 0.1, 0.0], 2021, 1.5),
        ("results", [0.0, 0.2, 0.9, 0.1], 2022, 2.0),
        ("appendix", [0.0, 0.0, 0.1, 0.9], 2015, 0.5),
        ("survey", [0.7, 0.3, 0.3, 0.0], 2023, 1.2),
    ];
    for (i, (name, vector, year, c1)) in docs.into_iter().enumerate() {
        g.add_vertex(
            VertexRecord::new(name)
                .with_vector(VectorObject::from_f32(&vector))
                .with_property("year", PropertyValue::Integer(year))
                .with_property("title", PropertyValue::Text(name.to_uppercase()))
                .with_rank(c1, 0.0)
                .with_degree(i as i64, 4 - i as i64),
        );
    }
    g.add_relationship("cites");
    g.add_relationship("mentions");
    g
}
