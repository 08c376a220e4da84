//! pi8 similarity kernels.
//!
//! Kernels operate on packed signed 8-bit arrays: the bytes of a string
//! or the elements of a [`VectorObject`](crate::core::VectorObject), each
//! with a float scale factor.
//!
//! | Kernel | Result |
//! |--------|--------|
//! | `ecld` | `sqrt(Σ(a·fa − b·fb)²)` |
//! | `ssq` | `Σa²` (unscaled) |
//! | `rsqrtssq` | `1/sqrt(Σa²)`, 0 for an all-zero array |
//! | `dp` | `Σab` (unscaled) |
//! | `cos` | `Σab / sqrt(Σa²·Σb²)` clamped to `[-1, 1]` |
//!
//! # Dispatch
//!
//! The instruction set is probed once per process and cached. The SIMD
//! paths consume whole blocks only (AVX-512: 64 bytes, AVX2: 32 bytes,
//! NEON: 16 bytes); trailing bytes that do not fill a block are ignored.
//! The scalar path consumes every byte.

mod scalar;

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;
#[cfg(target_arch = "aarch64")]
mod neon;

use std::sync::OnceLock;

use crate::config::SimdMode;

pub use scalar::{cos_scalar, dp_scalar, ecld_scalar, rsqrtssq_scalar, ssq_scalar};

/// Instruction set used by the kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdCapability {
    Scalar,
    /// AVX2 + FMA (x86_64)
    Avx2,
    /// AVX-512F (x86_64)
    Avx512,
    /// NEON (aarch64)
    Neon,
}

impl SimdCapability {
    pub const ALL: [SimdCapability; 4] =
        [SimdCapability::Scalar, SimdCapability::Avx2, SimdCapability::Avx512, SimdCapability::Neon];

    /// Every capability the running CPU can execute.
    pub fn supported() -> impl Iterator<Item = SimdCapability> {
        Self::ALL.into_iter().filter(|c| c.is_supported())
    }

    /// Probe the running CPU.
    #[allow(unreachable_code)]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") {
                return SimdCapability::Avx512;
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdCapability::Avx2;
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            return SimdCapability::Neon;
        }

        SimdCapability::Scalar
    }

    /// Whether this capability can run on the current CPU.
    #[allow(unreachable_code)]
    pub fn is_supported(self) -> bool {
        match self {
            SimdCapability::Scalar => true,
            SimdCapability::Avx512 => {
                #[cfg(target_arch = "x86_64")]
                {
                    return is_x86_feature_detected!("avx512f");
                }
                false
            }
            SimdCapability::Avx2 => {
                #[cfg(target_arch = "x86_64")]
                {
                    return is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma");
                }
                false
            }
            SimdCapability::Neon => cfg!(target_arch = "aarch64"),
        }
    }

    /// Bytes consumed per block.
    pub fn block_size(self) -> usize {
        match self {
            SimdCapability::Scalar => 1,
            SimdCapability::Avx2 => 32,
            SimdCapability::Avx512 => 64,
            SimdCapability::Neon => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SimdCapability::Scalar => "scalar",
            SimdCapability::Avx2 => "avx2",
            SimdCapability::Avx512 => "avx512",
            SimdCapability::Neon => "neon",
        }
    }
}

static SIMD_CAPABILITY: OnceLock<SimdCapability> = OnceLock::new();

/// Cached capability of this process.
pub fn simd_capability() -> SimdCapability {
    *SIMD_CAPABILITY.get_or_init(|| {
        let capability = SimdCapability::detect();
        tracing::debug!(capability = capability.name(), "pi8 kernels selected");
        capability
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Kernel Dispatcher
// ═══════════════════════════════════════════════════════════════════════════

/// pi8 kernel set bound to one instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernels {
    capability: SimdCapability,
}

impl Kernels {
    /// Kernels for the best detected instruction set.
    pub fn detect() -> Self {
        Self { capability: simd_capability() }
    }

    /// Kernels for a specific instruction set, or the detected one if the
    /// CPU lacks it.
    pub fn with_capability(capability: SimdCapability) -> Self {
        if capability.is_supported() {
            Self { capability }
        } else {
            Self::detect()
        }
    }

    /// Kernels selected by a configuration setting.
    pub fn from_mode(mode: SimdMode) -> Self {
        match mode {
            SimdMode::Auto => Self::detect(),
            SimdMode::Scalar => Self::with_capability(SimdCapability::Scalar),
            SimdMode::Avx2 => Self::with_capability(SimdCapability::Avx2),
            SimdMode::Avx512 => Self::with_capability(SimdCapability::Avx512),
            SimdMode::Neon => Self::with_capability(SimdCapability::Neon),
        }
    }

    pub fn capability(&self) -> SimdCapability {
        self.capability
    }

    /// Scaled euclidean distance over the common length of `a` and `b`.
    #[inline]
    pub fn ecld(&self, a: &[u8], fa: f32, b: &[u8], fb: f32) -> f64 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        match self.capability {
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx512 => unsafe { avx512::ecld_avx512(a, fa, b, fb) },
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx2 => unsafe { avx2::ecld_avx2(a, fa, b, fb) },
            #[cfg(target_arch = "aarch64")]
            SimdCapability::Neon => unsafe { neon::ecld_neon(a, fa, b, fb) },
            _ => ecld_scalar(a, fa, b, fb),
        }
    }

    #[inline]
    pub fn ssq(&self, a: &[u8]) -> f64 {
        match self.capability {
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx512 => unsafe { avx512::ssq_avx512(a) },
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx2 => unsafe { avx2::ssq_avx2(a) },
            #[cfg(target_arch = "aarch64")]
            SimdCapability::Neon => unsafe { neon::ssq_neon(a) },
            _ => ssq_scalar(a),
        }
    }

    #[inline]
    pub fn rsqrtssq(&self, a: &[u8]) -> f64 {
        match self.capability {
            #[cfg(target_arch = "aarch64")]
            SimdCapability::Neon => unsafe { neon::rsqrtssq_neon(a) },
            _ => reciprocal_sqrt(self.ssq(a)),
        }
    }

    #[inline]
    pub fn dp(&self, a: &[u8], b: &[u8]) -> f64 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        match self.capability {
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx512 => unsafe { avx512::dp_avx512(a, b) },
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx2 => unsafe { avx2::dp_avx2(a, b) },
            #[cfg(target_arch = "aarch64")]
            SimdCapability::Neon => unsafe { neon::dp_neon(a, b) },
            _ => dp_scalar(a, b),
        }
    }

    #[inline]
    pub fn cos(&self, a: &[u8], b: &[u8]) -> f64 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        match self.capability {
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx512 => unsafe { avx512::cos_avx512(a, b) },
            #[cfg(target_arch = "x86_64")]
            SimdCapability::Avx2 => unsafe { avx2::cos_avx2(a, b) },
            #[cfg(target_arch = "aarch64")]
            SimdCapability::Neon => unsafe { neon::cos_neon(a, b) },
            _ => cos_scalar(a, b),
        }
    }
}

impl Default for Kernels {
    fn default() -> Self {
        Self::detect()
    }
}

/// `1/sqrt(x)`, 0 for non-positive input.
#[inline]
pub(crate) fn reciprocal_sqrt(x: f64) -> f64 {
    if x > 0.0 {
        1.0 / x.sqrt()
    } else {
        0.0
    }
}

/// Cosine from a dot product and the product of the two norms.
///
/// When rounding pushes `|dp|` above `norm` the result saturates to the
/// sign of `dp`.
#[inline]
pub(crate) fn cosine(dp: f64, norm: f64) -> f64 {
    if norm > 0.0 && norm >= dp.abs() {
        dp / norm
    } else if dp > 0.0 {
        1.0
    } else if dp < 0.0 {
        -1.0
    } else {
        0.0
    }
}
