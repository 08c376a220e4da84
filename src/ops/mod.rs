//! Item-level semantics shared by stack, memory and array operators.
//!
//! Every function here takes operands by value and returns the result
//! item; nothing touches the stack. Stack operators, memory-in-place
//! operators and slice operators all route through the same rules so a
//! pair type degrades identically wherever it appears.
//!
//! - **compare**: equality, ordering, membership, string matching
//! - **arith**: binary and unary arithmetic with the promotion ladder
//! - **cast**: type conversions and stringification
//! - **bitwise**: shifts and masks
//! - **text**: string predicates, slicing, joins and element access
//!
//! Operators that need objects (strings, vectors) or vertex identifiers
//! receive an [`Env`].

pub mod arith;
pub mod bitwise;
pub mod cast;
pub mod compare;
pub mod text;

use crate::core::{EvalObject, GraphView, ObjectTable, StackItem, StringPattern, VectorObject};
use crate::similarity::Similarity;

pub use arith::MathFn;

/// Resources an operator may consult or allocate from.
pub struct Env<'a> {
    pub objects: &'a mut ObjectTable,
    pub graph: Option<&'a dyn GraphView>,
    pub similarity: &'a dyn Similarity,
}

impl<'a> Env<'a> {
    pub fn new(objects: &'a mut ObjectTable, graph: Option<&'a dyn GraphView>, similarity: &'a dyn Similarity) -> Self {
        Self { objects, graph, similarity }
    }

    /// Register an ephemeral string and return its item, `NONE` when the
    /// object budget is exhausted.
    pub fn scope_str(&mut self, object: EvalObject) -> StackItem {
        match self.objects.scoped(object) {
            Some(r) => StackItem::CString(r),
            None => StackItem::None,
        }
    }

    pub fn scope_vector(&mut self, vector: VectorObject) -> StackItem {
        match self.objects.scoped(EvalObject::Vector(vector)) {
            Some(r) => StackItem::Vector(r),
            None => StackItem::None,
        }
    }

    /// Bytes and wildcard pattern of a string-like item: a string object
    /// or the identifier of a vertex.
    pub fn text(&self, item: &StackItem) -> Option<(&[u8], StringPattern)> {
        match *item {
            StackItem::CString(r) => self.objects.str(r),
            StackItem::VertexId(v) | StackItem::Vertex(v) => {
                self.graph?.identifier(v).map(|id| (id.as_bytes(), StringPattern::Exact))
            }
            _ => None,
        }
    }

    pub fn vector(&self, item: &StackItem) -> Option<&VectorObject> {
        match *item {
            StackItem::Vector(r) => self.objects.vector(r),
            _ => None,
        }
    }

    pub fn object(&self, item: &StackItem) -> Option<&EvalObject> {
        match *item {
            StackItem::CString(r) | StackItem::Vector(r) => self.objects.get(r),
            _ => None,
        }
    }
}
