//! AVX-512F pi8 kernels, 64-byte blocks widened in four 16-byte groups.

use std::arch::x86_64::*;

use super::cosine;

const BLOCK: usize = 64;

/// Widen 16 signed bytes at `p` into 16 floats.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn load16(p: *const u8) -> __m512 {
    _mm512_cvtepi32_ps(_mm512_cvtepi8_epi32(_mm_loadu_si128(p as *const __m128i)))
}

#[target_feature(enable = "avx512f")]
pub unsafe fn ecld_avx512(a: &[u8], fa: f32, b: &[u8], fb: f32) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let sa = _mm512_set1_ps(fa);
    let sb = _mm512_set1_ps(fb);
    let mut acc = _mm512_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = _mm512_mul_ps(load16(pa.add(g * 16)), sa);
            let y = _mm512_mul_ps(load16(pb.add(g * 16)), sb);
            let d = _mm512_sub_ps(x, y);
            acc = _mm512_fmadd_ps(d, d, acc);
        }
    }
    (_mm512_reduce_add_ps(acc) as f64).sqrt()
}

#[target_feature(enable = "avx512f")]
pub unsafe fn ssq_avx512(a: &[u8]) -> f64 {
    let blocks = a.len() / BLOCK;
    let mut acc = _mm512_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = load16(pa.add(g * 16));
            acc = _mm512_fmadd_ps(x, x, acc);
        }
    }
    _mm512_reduce_add_ps(acc) as f64
}

#[target_feature(enable = "avx512f")]
pub unsafe fn dp_avx512(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut acc = _mm512_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            acc = _mm512_fmadd_ps(load16(pa.add(g * 16)), load16(pb.add(g * 16)), acc);
        }
    }
    _mm512_reduce_add_ps(acc) as f64
}

#[target_feature(enable = "avx512f")]
pub unsafe fn cos_avx512(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut dp = _mm512_setzero_ps();
    let mut ssa = _mm512_setzero_ps();
    let mut ssb = _mm512_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = load16(pa.add(g * 16));
            let y = load16(pb.add(g * 16));
            dp = _mm512_fmadd_ps(x, y, dp);
            ssa = _mm512_fmadd_ps(x, x, ssa);
            ssb = _mm512_fmadd_ps(y, y, ssb);
        }
    }
    let norm = (_mm512_reduce_add_ps(ssa) as f64 * _mm512_reduce_add_ps(ssb) as f64).sqrt();
    cosine(_mm512_reduce_add_ps(dp) as f64, norm)
}
