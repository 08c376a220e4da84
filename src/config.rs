//! Evaluator configuration.
//!
//! Settings are plain data with serde support so a host can load them
//! from JSON alongside the rest of its search configuration. Every field
//! has a default; a partial document only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::core::error::{EvalError, EvalResult};
use crate::core::memory::{MAX_ORDER, MIN_ORDER};

/// Upper bound accepted for the cull heap capacity setting.
pub const CULL_LIMIT: usize = 1 << 20;

/// Which pi8 kernel family to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimdMode {
    /// Best instruction set detected on this CPU.
    #[default]
    Auto,
    Scalar,
    Avx2,
    Avx512,
    Neon,
}

/// Configuration for one evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum operand stack depth.
    pub stack_capacity: usize,
    /// Memory bank order used when the program does not request one.
    pub memory_order: u32,
    /// Largest cull heap a program may request.
    pub max_cull: usize,
    /// Ephemeral objects allowed per evaluation.
    pub object_budget: usize,
    /// Kernel selection; unsupported requests fall back to detection.
    pub simd: SimdMode,
    /// Check the timing budget halt flag after every operation.
    pub check_halt: bool,
    /// Seed for the evaluator's random generator.
    pub random_seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            stack_capacity: 1024,
            memory_order: 10,
            max_cull: 4096,
            object_budget: 65536,
            simd: SimdMode::Auto,
            check_halt: true,
            random_seed: 0x5eed,
        }
    }
}

impl EvalConfig {
    /// Strict mode: small stack and bank, halt checks after every op.
    pub fn strict() -> Self {
        Self {
            stack_capacity: 256,
            memory_order: 8,
            max_cull: 1024,
            object_budget: 4096,
            simd: SimdMode::Auto,
            check_halt: true,
            random_seed: 0x5eed,
        }
    }

    /// Permissive mode: large stack, large object budget, no halt polling.
    pub fn permissive() -> Self {
        Self {
            stack_capacity: 16384,
            memory_order: 16,
            max_cull: 65536,
            object_budget: 1 << 20,
            simd: SimdMode::Auto,
            check_halt: false,
            random_seed: 0x5eed,
        }
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> EvalResult<()> {
        if self.stack_capacity == 0 {
            return Err(EvalError::config("stack_capacity must be positive"));
        }
        if !(MIN_ORDER..=MAX_ORDER).contains(&self.memory_order) {
            return Err(EvalError::InvalidMemoryOrder {
                order: self.memory_order,
                min: MIN_ORDER,
                max: MAX_ORDER,
            });
        }
        if self.max_cull > CULL_LIMIT {
            return Err(EvalError::config(format!(
                "max_cull {} exceeds limit {}",
                self.max_cull, CULL_LIMIT
            )));
        }
        if self.object_budget == 0 {
            return Err(EvalError::config("object_budget must be positive"));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> EvalResult<Self> {
        let config: EvalConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EvalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
