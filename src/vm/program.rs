//! Compiled programs.
//!
//! A [`Program`] is the operation array produced by an expression compiler,
//! together with the constants its immediates refer to and the resources
//! it asks of the evaluator (bank order, cull heap capacity, op limit).
//!
//! # Passthru Trailer
//!
//! The last `passthru` operations form a trailer that runs after the main
//! body falls off its end. `return` skips the trailer.
//!
//! # Validation
//!
//! [`Program::validate`] runs once when the program is bound. It rejects
//! structural errors and simulates the stack depth linearly, so the
//! evaluator never checks capacity per operation.

use std::fmt;

use crate::core::{EvalError, EvalObject, EvalResult, ObjectRef, ObjectTable};

use super::opcode::{Op, OpArg};

/// An executable operation array.
#[derive(Debug, Clone)]
pub struct Program {
    ops: Vec<Op>,
    constants: ObjectTable,
    passthru: usize,
    cull: usize,
    memory_order: Option<u32>,
    limit: u64,
}

impl Program {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            constants: ObjectTable::new(0),
            passthru: 0,
            cull: 0,
            memory_order: None,
            limit: 0,
        }
    }

    /// Empty program for incremental assembly with [`Program::op`].
    pub fn builder() -> Self {
        Self::new(Vec::new())
    }

    /// Append an operation.
    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Register a constant object and return its handle for use in immediates.
    pub fn constant(&mut self, object: EvalObject) -> ObjectRef {
        self.constants.pin(object)
    }

    /// Register a string constant and return the `push` immediate for it.
    pub fn string(&mut self, text: &str) -> OpArg {
        OpArg::Object(self.constant(EvalObject::pattern(text)))
    }

    pub fn with_passthru(mut self, n: usize) -> Self {
        self.passthru = n;
        self
    }

    pub fn with_cull(mut self, k: usize) -> Self {
        self.cull = k;
        self
    }

    pub fn with_memory_order(mut self, order: u32) -> Self {
        self.memory_order = Some(order);
        self
    }

    /// Cap the number of operations one evaluation may execute. Zero means no cap.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[inline]
    pub fn passthru(&self) -> usize {
        self.passthru
    }

    /// Operations before the passthru trailer.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.ops.len().saturating_sub(self.passthru)
    }

    #[inline]
    pub fn cull(&self) -> usize {
        self.cull
    }

    #[inline]
    pub fn memory_order(&self) -> Option<u32> {
        self.memory_order
    }

    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn constants(&self) -> &ObjectTable {
        &self.constants
    }

    /// Check the program's structure and return its maximum stack depth.
    pub fn validate(&self) -> EvalResult<usize> {
        if self.ops.is_empty() {
            return Err(EvalError::invalid_program("program has no operations"));
        }
        if self.passthru > self.ops.len() {
            return Err(EvalError::invalid_program(format!(
                "passthru {} exceeds op count {}",
                self.passthru,
                self.ops.len()
            )));
        }

        let mut depth = 0usize;
        let mut max_depth = 0usize;
        for (pc, op) in self.ops.iter().enumerate() {
            if op.code.is_variadic() {
                if let OpArg::Int(n) = op.arg {
                    if n < 0 {
                        return Err(EvalError::invalid_program(format!(
                            "{} at {} has negative argument count {}",
                            op.code, pc, n
                        )));
                    }
                }
            }
            if op.code.is_jump() {
                let target = match op.arg {
                    OpArg::Int(t) => t,
                    _ => -1,
                };
                if target <= pc as i64 || target > self.ops.len() as i64 {
                    return Err(EvalError::invalid_program(format!(
                        "{} at {} has invalid target {}",
                        op.code, pc, target
                    )));
                }
            }
            let (pops, pushes) = op.code.stack_effect(op.nargs());
            depth = depth.saturating_sub(pops) + pushes;
            max_depth = max_depth.max(depth);
        }
        Ok(max_depth)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body_len();
        for (pc, op) in self.ops.iter().enumerate() {
            if pc == body {
                writeln!(f, "      ; passthru")?;
            }
            writeln!(f, "{:04}  {}", pc, op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCategory;
    use crate::vm::opcode::OpCode;

    fn arithmetic() -> Program {
        Program::builder()
            .op(Op::push(OpArg::Int(3)))
            .op(Op::push(OpArg::Int(4)))
            .op(Op::bare(OpCode::Add))
            .op(Op::push(OpArg::Int(2)))
            .op(Op::bare(OpCode::Mul))
    }

    #[test]
    fn test_depth_simulation() {
        assert_eq!(arithmetic().validate().unwrap(), 2);
        let wide = Program::new(vec![Op::push(OpArg::Int(1)); 5]).op(Op::variadic(OpCode::Do, 5));
        assert_eq!(wide.validate().unwrap(), 5);
    }

    #[test]
    fn test_structural_errors() {
        let err = Program::new(Vec::new()).validate().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Program);

        assert!(arithmetic().with_passthru(6).validate().is_err());
        assert!(arithmetic().with_passthru(5).validate().is_ok());

        let backward = arithmetic().op(Op::new(OpCode::Jump, OpArg::Int(1)));
        assert!(backward.validate().is_err());
        let forward = Program::builder().op(Op::new(OpCode::Jump, OpArg::Int(1)));
        assert!(forward.validate().is_ok());

        let negative = Program::builder().op(Op::variadic(OpCode::First, -1));
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_constants_and_listing() {
        let mut program = Program::builder();
        let arg = program.string("abc");
        let program = program.op(Op::push(arg)).op(Op::bare(OpCode::Len)).with_passthru(1);
        assert!(matches!(arg, OpArg::Object(r) if program.constants().str(r).is_some()));
        assert_eq!(program.body_len(), 1);
        let listing = program.to_string();
        assert!(listing.contains("; passthru"));
        assert!(listing.contains("0001  len"));
    }
}
