//! Typed-stack expression evaluator for graph and vector search.
//!
//! A search compiles each filter and ranking expression into a [`Program`]
//! once, binds it to an [`Evaluator`] per worker, then runs it for every
//! vertex or arc the traversal visits. Each run reads the traversal state
//! from an [`EvalContext`] and leaves a single [`StackItem`] as its verdict
//! or score.
//!
//! Operators never fail. Type mismatches, bad addresses and divisions by
//! zero degrade to documented values; only binding a program can return an
//! [`EvalError`].

// ═══════════════════════════════════════════════════════════════════════════
// Layer 0: Core (No internal dependencies)
// ═══════════════════════════════════════════════════════════════════════════
pub mod core;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 1: Item Semantics & Engines (depends on core)
// ═══════════════════════════════════════════════════════════════════════════
pub mod config;
pub mod ops;
pub mod simd;
pub mod similarity;
pub mod heap;
pub mod decay;
pub mod probe;
pub mod collect;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 2: Traversal Context (depends on core, collect)
// ═══════════════════════════════════════════════════════════════════════════
pub mod context;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 3: VM (depends on all of the above)
// ═══════════════════════════════════════════════════════════════════════════
pub mod vm;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use crate::core::{
    property_key, ErrorCategory, EvalError, EvalObject, EvalResult, GraphView, ItemType, KeyVal, ObjectRef,
    Predicator, PropertyValue, Rank, StackItem, StaticGraph, VectorObject, VertexRecord, VertexRef,
};
pub use collect::{ArcRef, CollectedItem, Collector, CollectorKind, ResultCollector};
pub use config::{EvalConfig, SimdMode};
pub use context::{EvalContext, Role, TimingBudget};
pub use heap::{ArcHeadHeapItem, Polarity};
pub use similarity::{CosineSimilarity, Similarity};
pub use vm::{Evaluation, Evaluator, ExitStatus, Op, OpArg, OpCode, Program};

use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════
// Batch Evaluation
// ═══════════════════════════════════════════════════════════════════════════

/// Evaluate one program against many contexts.
///
/// The program is bound once; every worker runs a private clone of that
/// evaluator, so results match a sequential loop over `contexts` except
/// for the random streams, which each worker restarts from the seed.
/// With the `parallel` feature the contexts are split across the rayon
/// pool.
pub fn evaluate_batch(
    program: impl Into<Arc<Program>>,
    config: EvalConfig,
    contexts: &mut [EvalContext<'_>],
) -> EvalResult<Vec<Evaluation>> {
    let prototype = Evaluator::new(program, config)?;
    tracing::debug!(contexts = contexts.len(), parallel = cfg!(feature = "parallel"), "batch evaluation");

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        Ok(contexts
            .par_iter_mut()
            .map_init(|| prototype.clone(), |vm, ctx| vm.evaluate(ctx))
            .collect())
    }

    #[cfg(not(feature = "parallel"))]
    {
        let mut vm = prototype;
        Ok(contexts.iter_mut().map(|ctx| vm.evaluate(ctx)).collect())
    }
}

mod determinism_tests;
