//! NEON pi8 kernels, 16-byte blocks widened to four 4-lane float vectors.
//!
//! Reciprocal square roots use the hardware estimate refined with two
//! Newton-Raphson steps.

use std::arch::aarch64::*;

use super::cosine;

const BLOCK: usize = 16;

/// Widen 16 signed bytes at `p` into four float vectors.
#[inline]
#[target_feature(enable = "neon")]
unsafe fn load16(p: *const u8) -> [float32x4_t; 4] {
    let v = vld1q_s8(p as *const i8);
    let lo = vmovl_s8(vget_low_s8(v));
    let hi = vmovl_s8(vget_high_s8(v));
    [
        vcvtq_f32_s32(vmovl_s16(vget_low_s16(lo))),
        vcvtq_f32_s32(vmovl_s16(vget_high_s16(lo))),
        vcvtq_f32_s32(vmovl_s16(vget_low_s16(hi))),
        vcvtq_f32_s32(vmovl_s16(vget_high_s16(hi))),
    ]
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn rsqrt(x: f32) -> f32 {
    let v = vdup_n_f32(x);
    let mut e = vrsqrte_f32(v);
    e = vmul_f32(e, vrsqrts_f32(vmul_f32(v, e), e));
    e = vmul_f32(e, vrsqrts_f32(vmul_f32(v, e), e));
    vget_lane_f32::<0>(e)
}

#[target_feature(enable = "neon")]
pub unsafe fn ecld_neon(a: &[u8], fa: f32, b: &[u8], fb: f32) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut acc = vdupq_n_f32(0.0);
    for i in 0..blocks {
        let xa = load16(a.as_ptr().add(i * BLOCK));
        let xb = load16(b.as_ptr().add(i * BLOCK));
        for g in 0..4 {
            let d = vsubq_f32(vmulq_n_f32(xa[g], fa), vmulq_n_f32(xb[g], fb));
            acc = vfmaq_f32(acc, d, d);
        }
    }
    (vaddvq_f32(acc) as f64).sqrt()
}

#[target_feature(enable = "neon")]
pub unsafe fn ssq_neon(a: &[u8]) -> f64 {
    let blocks = a.len() / BLOCK;
    let mut acc = vdupq_n_f32(0.0);
    for i in 0..blocks {
        for x in load16(a.as_ptr().add(i * BLOCK)) {
            acc = vfmaq_f32(acc, x, x);
        }
    }
    vaddvq_f32(acc) as f64
}

#[target_feature(enable = "neon")]
pub unsafe fn rsqrtssq_neon(a: &[u8]) -> f64 {
    let ssq = ssq_neon(a) as f32;
    if ssq > 0.0 {
        rsqrt(ssq) as f64
    } else {
        0.0
    }
}

#[target_feature(enable = "neon")]
pub unsafe fn dp_neon(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut acc = vdupq_n_f32(0.0);
    for i in 0..blocks {
        let xa = load16(a.as_ptr().add(i * BLOCK));
        let xb = load16(b.as_ptr().add(i * BLOCK));
        for g in 0..4 {
            acc = vfmaq_f32(acc, xa[g], xb[g]);
        }
    }
    vaddvq_f32(acc) as f64
}

#[target_feature(enable = "neon")]
pub unsafe fn cos_neon(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut dp = vdupq_n_f32(0.0);
    let mut ssa = vdupq_n_f32(0.0);
    let mut ssb = vdupq_n_f32(0.0);
    for i in 0..blocks {
        let xa = load16(a.as_ptr().add(i * BLOCK));
        let xb = load16(b.as_ptr().add(i * BLOCK));
        for g in 0..4 {
            dp = vfmaq_f32(dp, xa[g], xb[g]);
            ssa = vfmaq_f32(ssa, xa[g], xa[g]);
            ssb = vfmaq_f32(ssb, xb[g], xb[g]);
        }
    }
    let m = vaddvq_f32(ssa) * vaddvq_f32(ssb);
    if m > 0.0 {
        let r = rsqrt(m) as f64;
        cosine(vaddvq_f32(dp) as f64, 1.0 / r)
    } else {
        cosine(vaddvq_f32(dp) as f64, 0.0)
    }
}
