//! Expression evaluator.
//!
//! Compiled expressions run on a small stack machine:
//!
//! - **opcode**: the instruction set, one variant per operator family
//! - **program**: the operation array with its constants and resource requests
//! - **evaluator**: the control loop, bind-time validation and dispatch
//!
//! # Executors
//!
//! Operator families are implemented as `impl Evaluator` blocks split by
//! concern, each reading operands from the stack and writing the result in
//! place:
//!
//! - `exec_control`: stack shuffles, conditionals, jumps, membership, logic
//! - `exec_math`: arithmetic, casts, bitwise, strings, vectors, probes
//! - `exec_memory`: scalar bank access, the bank stack, counters, sets
//! - `exec_array`: slice transforms, reductions, sorting, heaps, culling
//! - `exec_graph`: vertex and arc context, decay, arc groups, collection

/// Operator environment over an evaluator's fields, borrowed disjointly
/// from the stack and the bank.
macro_rules! op_env {
    ($vm:expr, $ctx:expr) => {
        $crate::ops::Env::new(&mut $vm.objects, $ctx.graph, &*$vm.similarity)
    };
}

pub mod evaluator;
pub mod opcode;
pub mod program;

mod exec_array;
mod exec_control;
mod exec_graph;
mod exec_math;
mod exec_memory;

pub use evaluator::{Evaluation, Evaluator, ExitStatus};
pub use opcode::{
    Addr, ArcField, ArcSide, CmpOp, Constant, Extreme, Kernel, MemOp, Op, OpArg, OpCode, RawOp, Reduce,
    VertexField,
};
pub use program::Program;
