//! Core types for the expression evaluator.
//!
//! This module defines the data the machine operates on:
//!
//! - **Item**: tagged stack values, predicators and hashing
//! - **Object**: strings, arrays, maps and vectors behind stack handles
//! - **Stack**: the bounded operand stack
//! - **Memory**: the masked scratch bank with registers
//! - **DwSet**: the membership set kept inside the bank
//! - **Graph**: the read-only view of vertices being scored
//! - **Error**: boundary errors
//!
//! # Layer 0 - No Internal Dependencies
//!
//! Nothing here depends on other crate modules, so every layer can import it.

pub mod item;
pub mod object;
pub mod error;
pub mod stack;
pub mod memory;
pub mod dwset;
pub mod graph;

// Re-export primary types at module level
pub use item::{
    are_bit_comparable, hash_bytes, ihash64, ArcDir, ItemType, KeyVal, ObjectRef, PairType,
    Predicator, StackItem, VertexRef,
};
pub use object::{EvalObject, Lifetime, ObjectTable, StringPattern, VectorObject};
pub use error::{ErrorCategory, EvalError, EvalResult};
pub use stack::EvalStack;
pub use memory::{admit, Contiguous, MemoryBank, Register};
pub use dwset::{DwSet, KeyMode};
pub use graph::{
    property_key, GraphView, PropertyValue, Rank, StaticGraph, Timestamps, VertexRecord, TIME_NEVER,
};
