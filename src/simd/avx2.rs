//! AVX2 + FMA pi8 kernels, 32-byte blocks.
//!
//! Each block is widened in four 8-byte groups: bytes to 8x i32 to 8x f32.

use std::arch::x86_64::*;

use super::cosine;

const BLOCK: usize = 32;

/// Widen 8 signed bytes at `p` into 8 floats.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load8(p: *const u8) -> __m256 {
    _mm256_cvtepi32_ps(_mm256_cvtepi8_epi32(_mm_loadl_epi64(p as *const __m128i)))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum(v: __m256) -> f32 {
    let high = _mm256_extractf128_ps(v, 1);
    let low = _mm256_castps256_ps128(v);
    let sum128 = _mm_add_ps(low, high);
    let sum64 = _mm_add_ps(sum128, _mm_movehl_ps(sum128, sum128));
    let sum32 = _mm_add_ss(sum64, _mm_shuffle_ps(sum64, sum64, 1));
    _mm_cvtss_f32(sum32)
}

#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn ecld_avx2(a: &[u8], fa: f32, b: &[u8], fb: f32) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let sa = _mm256_set1_ps(fa);
    let sb = _mm256_set1_ps(fb);
    let mut acc = _mm256_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = _mm256_mul_ps(load8(pa.add(g * 8)), sa);
            let y = _mm256_mul_ps(load8(pb.add(g * 8)), sb);
            let d = _mm256_sub_ps(x, y);
            acc = _mm256_fmadd_ps(d, d, acc);
        }
    }
    (hsum(acc) as f64).sqrt()
}

#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn ssq_avx2(a: &[u8]) -> f64 {
    let blocks = a.len() / BLOCK;
    let mut acc = _mm256_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = load8(pa.add(g * 8));
            acc = _mm256_fmadd_ps(x, x, acc);
        }
    }
    hsum(acc) as f64
}

#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn dp_avx2(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut acc = _mm256_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            acc = _mm256_fmadd_ps(load8(pa.add(g * 8)), load8(pb.add(g * 8)), acc);
        }
    }
    hsum(acc) as f64
}

#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn cos_avx2(a: &[u8], b: &[u8]) -> f64 {
    let blocks = a.len().min(b.len()) / BLOCK;
    let mut dp = _mm256_setzero_ps();
    let mut ssa = _mm256_setzero_ps();
    let mut ssb = _mm256_setzero_ps();
    for i in 0..blocks {
        let pa = a.as_ptr().add(i * BLOCK);
        let pb = b.as_ptr().add(i * BLOCK);
        for g in 0..4 {
            let x = load8(pa.add(g * 8));
            let y = load8(pb.add(g * 8));
            dp = _mm256_fmadd_ps(x, y, dp);
            ssa = _mm256_fmadd_ps(x, x, ssa);
            ssb = _mm256_fmadd_ps(y, y, ssb);
        }
    }
    let norm = (hsum(ssa) as f64 * hsum(ssb) as f64).sqrt();
    cosine(hsum(dp) as f64, norm)
}
