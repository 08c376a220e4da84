//! Portable pi8 kernels, double-precision accumulation over every byte.

use super::{cosine, reciprocal_sqrt};

#[inline]
fn s(x: u8) -> f64 {
    x as i8 as f64
}

/// Scaled euclidean distance.
pub fn ecld_scalar(a: &[u8], fa: f32, b: &[u8], fb: f32) -> f64 {
    let (fa, fb) = (fa as f64, fb as f64);
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = s(x) * fa - s(y) * fb;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Sum of squares.
pub fn ssq_scalar(a: &[u8]) -> f64 {
    a.iter().map(|&x| s(x) * s(x)).sum()
}

pub fn rsqrtssq_scalar(a: &[u8]) -> f64 {
    reciprocal_sqrt(ssq_scalar(a))
}

/// Dot product.
pub fn dp_scalar(a: &[u8], b: &[u8]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| s(x) * s(y)).sum()
}

/// Cosine similarity, 0 when either array has zero magnitude.
pub fn cos_scalar(a: &[u8], b: &[u8]) -> f64 {
    let (mut dp, mut ssa, mut ssb) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (s(x), s(y));
        dp += x * y;
        ssa += x * x;
        ssb += y * y;
    }
    let m = ssa * ssb;
    if m == 0.0 {
        return 0.0;
    }
    cosine(dp, m.sqrt())
}
