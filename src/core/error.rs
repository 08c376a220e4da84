//! Error types for the evaluator.
//!
//! The execution loop itself never fails: type mismatches, wrapped
//! addresses and zero divisors all degrade to documented stack values.
//! [`EvalError`] covers what can go wrong at the boundary, when a program
//! is bound to an evaluator or a configuration is loaded.
//!
//! # Error Categories
//!
//! - **Program**: the compiled program is structurally unusable
//! - **Resource**: the program asks for more than the evaluator can provide
//! - **Configuration**: settings could not be parsed or are out of range

use thiserror::Error;

/// Result alias used across the crate.
pub type EvalResult<T> = Result<T, EvalError>;

/// Broad classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Program,
    Resource,
    Configuration,
}

/// Errors raised while preparing or configuring an evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    // ═══════════════════════════════════════════════════════════════════
    // Program Errors
    // ═══════════════════════════════════════════════════════════════════

    /// The program cannot be executed as given.
    #[error("invalid program: {reason}")]
    InvalidProgram { reason: String },

    /// The program's static stack depth exceeds the evaluator stack.
    #[error("stack overflow: program needs depth {depth}, capacity is {capacity}")]
    StackOverflow { depth: usize, capacity: usize },

    // ═══════════════════════════════════════════════════════════════════
    // Resource Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Memory bank order outside the supported range.
    #[error("invalid memory order {order} (expected {min}..={max})")]
    InvalidMemoryOrder { order: u32, min: u32, max: u32 },

    /// Cull heap capacity larger than the configured maximum.
    #[error("cull capacity {requested} exceeds maximum {max}")]
    InvalidCullCapacity { requested: usize, max: usize },

    // ═══════════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Configuration failed validation.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    pub fn invalid_program(reason: impl Into<String>) -> Self {
        EvalError::InvalidProgram { reason: reason.into() }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        EvalError::Config { reason: reason.into() }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EvalError::InvalidProgram { .. } | EvalError::StackOverflow { .. } => ErrorCategory::Program,
            EvalError::InvalidMemoryOrder { .. } | EvalError::InvalidCullCapacity { .. } => ErrorCategory::Resource,
            EvalError::Config { .. } | EvalError::Json(_) => ErrorCategory::Configuration,
        }
    }

    /// Resource errors can be retried with a larger configuration.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(EvalError::invalid_program("empty").category(), ErrorCategory::Program);
        let e = EvalError::InvalidCullCapacity { requested: 10, max: 5 };
        assert_eq!(e.category(), ErrorCategory::Resource);
        assert!(e.is_recoverable());
        assert!(!EvalError::config("bad").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let e = EvalError::StackOverflow { depth: 40, capacity: 32 };
        assert_eq!(e.to_string(), "stack overflow: program needs depth 40, capacity is 32");
        let e = EvalError::InvalidMemoryOrder { order: 30, min: 2, max: 24 };
        assert!(e.to_string().contains("30"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let e: EvalError = parse.unwrap_err().into();
        assert_eq!(e.category(), ErrorCategory::Configuration);
    }
}
