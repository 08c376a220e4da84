//! Benchmark tests for the vxeval evaluator.
//!
//! Timing harness comparing evaluation paths:
//! - A reused evaluator against rebinding per call
//! - Auto-detected SIMD kernels against the scalar kernels
//! - Sequential evaluation against `evaluate_batch`
//!
//! ## Benchmark Categories
//!
//! - **Arithmetic**: Stack and numeric operator throughput
//! - **Memory**: Bank reduction and heap operators
//! - **Graph**: Property filters and vector similarity over a fixture
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmark tests
//! cargo test benchmark --release -- --nocapture
//!
//! # Run specific benchmark
//! cargo test benchmark::benchmark_similarity --release -- --nocapture
//! ```

use std::time::{Duration, Instant};

use crate::common::*;
use vxeval::vm::{CmpOp, Reduce, VertexField};
use vxeval::*;

/// Minimum iterations for stable timing.
const MIN_ITERATIONS: u32 = 10;
/// Target benchmark duration in milliseconds.
const TARGET_DURATION_MS: u64 = 100;
/// Hard cap on iterations.
const MAX_ITERATIONS: u32 = 100_000;

// =============================================================================
// Benchmark Infrastructure
// =============================================================================

/// Result of a single benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    /// Name of the benchmark.
    pub name: String,
    /// Total time for all iterations.
    pub total_time: Duration,
    /// Number of iterations.
    pub iterations: u32,
    /// Total operations executed.
    pub total_ops: u64,
    /// Whether every evaluation completed normally.
    pub success: bool,
}

impl BenchmarkResult {
    /// Average time per iteration.
    pub fn avg_time(&self) -> Duration {
        self.total_time / self.iterations.max(1)
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }

    /// Print benchmark result.
    pub fn print(&self) {
        println!(
            "{}: {:?}/iter ({} iters, {:.2}M ops/sec)",
            self.name,
            self.avg_time(),
            self.iterations,
            self.ops_per_second() / 1_000_000.0
        );
    }
}

/// Compare two benchmark results.
pub fn compare_results(baseline: &BenchmarkResult, candidate: &BenchmarkResult) {
    let speedup = baseline.avg_time().as_nanos() as f64 / candidate.avg_time().as_nanos().max(1) as f64;
    println!("  {} vs {}: {:.2}x speedup", baseline.name, candidate.name, speedup);
}

/// Time `step` until the target duration and minimum iterations are met.
/// `step` returns the operations it executed and whether it succeeded.
fn measure(name: &str, mut step: impl FnMut() -> (u64, bool)) -> BenchmarkResult {
    let start = Instant::now();
    let mut iterations = 0u32;
    let mut total_ops = 0u64;
    let mut success = true;

    while iterations < MIN_ITERATIONS || start.elapsed().as_millis() < TARGET_DURATION_MS as u128 {
        let (ops, ok) = step();
        total_ops += ops;
        success &= ok;
        iterations += 1;
        if iterations >= MAX_ITERATIONS {
            break;
        }
    }

    BenchmarkResult { name: name.to_string(), total_time: start.elapsed(), iterations, total_ops, success }
}

fn completed(e: &Evaluation) -> bool {
    matches!(e.status, ExitStatus::Completed | ExitStatus::Returned)
}

/// Evaluate `program` against every vertex of `g` with one evaluator.
fn sweep(vm: &mut Evaluator, g: &StaticGraph) -> (u64, bool) {
    let mut ops = 0;
    let mut ok = true;
    for v in 0..g.order() as u64 {
        let mut ctx = EvalContext::new(Some(g)).with_vertices(None, Some(VertexRef(v)), None);
        let e = vm.evaluate(&mut ctx);
        ops += e.ops;
        ok &= completed(&e);
    }
    (ops, ok)
}

/// A larger corpus: `n` documents with 64-dimensional vectors.
fn wide_corpus(n: usize) -> StaticGraph {
    let mut g = StaticGraph::new();
    for i in 0..n {
        let vector: Vec<f32> = (0..64).map(|d| (((i * 31 + d * 17) % 97) as f32 / 97.0) - 0.5).collect();
        g.add_vertex(
            VertexRecord::new(format!("doc{i}"))
                .with_vector(VectorObject::from_f32(&vector))
                .with_property("year", PropertyValue::Integer(2000 + (i % 25) as i64))
                .with_rank(1.0 + (i % 3) as f32, 0.0)
                .with_degree(i as i64 % 7, i as i64 % 5),
        );
    }
    g
}

// =============================================================================
// Benchmark Programs
// =============================================================================

/// `((a * b) + c) / d` style chain repeated `n` times.
fn arithmetic_chain(n: usize) -> Program {
    let mut ops = vec![int(1)];
    for i in 0..n as i64 {
        ops.extend([int(i + 3), op(OpCode::Mul), real(0.5), op(OpCode::Add), int(7), op(OpCode::Mod)]);
    }
    Program::new(ops)
}

/// Fill 256 cells, sum them, then keep the top 16 in a heap.
fn memory_workload() -> Program {
    let mut ops = Vec::new();
    for chunk in 0..16i64 {
        let values: Vec<Op> = (0..16).map(|i| int((chunk * 16 + i) * 7919 % 1000)).collect();
        ops.extend(fill(chunk * 16, &values));
    }
    ops.extend([int(300), int(0), int(255), op(OpCode::MReduce { kind: Reduce::Sum, raw: false }), op(OpCode::Pop)]);
    ops.extend([int(512), int(16), op(OpCode::MHeapInit), op(OpCode::Pop)]);
    ops.extend([int(512), int(16), int(0), int(255), op(OpCode::MHeapSift(Polarity::Min))]);
    Program::new(ops)
}

/// `vertex['year'] >= 2010 and vertex.odeg > 1`
fn filter_program() -> Program {
    Program::new(vec![
        int(property_key("year")),
        var(OpCode::Property(Role::This), 1),
        int(2010),
        op(OpCode::Compare(CmpOp::Gte)),
        op(OpCode::Vertex(Role::This, VertexField::OutDegree)),
        int(1),
        op(OpCode::Compare(CmpOp::Gt)),
        op(OpCode::And),
    ])
}

/// `rank(sim(vertex.vector, query))` with a top-32 cull.
fn similarity_program() -> Program {
    let query: Vec<f32> = (0..64).map(|d| ((d % 11) as f32 / 11.0) - 0.5).collect();
    let mut program = Program::builder();
    let query = program.constant(EvalObject::Vector(VectorObject::from_f32(&query)));
    program
        .op(op(OpCode::Vertex(Role::This, VertexField::Vector)))
        .op(Op::push(OpArg::Vector(query)))
        .op(op(OpCode::Sim))
        .op(var(OpCode::Rank, 1))
        .op(int(32))
        .op(op(OpCode::MCull))
        .with_cull(32)
}

// =============================================================================
// Benchmark Tests
// =============================================================================

#[test]
fn benchmark_arithmetic() {
    println!("\n=== Arithmetic Benchmark ===");

    let program = arithmetic_chain(200);
    let mut vm = bind(program.clone());
    let reused = measure("arith:reused", || {
        let e = vm.evaluate(&mut EvalContext::detached());
        (e.ops, completed(&e))
    });
    reused.print();

    let rebound = measure("arith:rebind", || {
        let e = bind(program.clone()).evaluate(&mut EvalContext::detached());
        (e.ops, completed(&e))
    });
    rebound.print();
    compare_results(&rebound, &reused);

    assert!(reused.success && rebound.success);
}

#[test]
fn benchmark_memory() {
    println!("\n=== Memory Bank Benchmark ===");

    let mut vm = bind(memory_workload());
    let result = measure("memory", || {
        let e = vm.evaluate(&mut EvalContext::detached());
        (e.ops, completed(&e))
    });
    result.print();

    assert!(result.success);
}

#[test]
fn benchmark_filter() {
    println!("\n=== Property Filter Benchmark ===");

    let g = wide_corpus(1000);
    let mut vm = bind(filter_program());
    let result = measure("filter", || sweep(&mut vm, &g));
    result.print();

    assert!(result.success);
}

#[test]
fn benchmark_similarity() {
    println!("\n=== Similarity Benchmark ===");

    let g = wide_corpus(1000);
    let mut auto = bind(similarity_program());
    let detected = measure("sim:auto", || {
        auto.reset_cull();
        sweep(&mut auto, &g)
    });
    detected.print();

    let config = EvalConfig { simd: SimdMode::Scalar, ..EvalConfig::default() };
    let mut scalar = Evaluator::new(similarity_program(), config).expect("Failed to bind program");
    let reference = measure("sim:scalar", || {
        scalar.reset_cull();
        sweep(&mut scalar, &g)
    });
    reference.print();
    compare_results(&reference, &detected);

    assert!(detected.success && reference.success);
    assert_eq!(auto.culled().len(), 32);
}

#[test]
fn benchmark_batch() {
    println!("\n=== Batch Benchmark ===");

    let g = wide_corpus(4000);
    let program = std::sync::Arc::new(filter_program());

    let mut vm = bind((*program).clone());
    let sequential = measure("batch:sequential", || sweep(&mut vm, &g));
    sequential.print();

    let batch = measure("batch:evaluate_batch", || {
        let mut contexts: Vec<EvalContext<'_>> = (0..g.order() as u64)
            .map(|v| EvalContext::new(Some(&g)).with_vertices(None, Some(VertexRef(v)), None))
            .collect();
        match evaluate_batch(program.clone(), EvalConfig::default(), &mut contexts) {
            Ok(results) => (results.iter().map(|e| e.ops).sum(), results.iter().all(completed)),
            Err(_) => (0, false),
        }
    });
    batch.print();
    compare_results(&sequential, &batch);

    assert!(sequential.success && batch.success);
}
