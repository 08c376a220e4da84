//! Vector similarity engine.
//!
//! Vector operators never look at elements directly; they go through a
//! [`Similarity`] implementation supplied to the evaluator. Every method
//! has a default built on the pi8 [`Kernels`], so an engine only decides
//! its match threshold and which score counts as "similarity".

use std::cmp::Ordering;

use crate::core::VectorObject;
use crate::simd::Kernels;

/// Default cosine threshold for [`Similarity::matches`].
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Vector math used by equality, ordering and arithmetic on `VECTOR` items.
pub trait Similarity: Send + Sync {
    fn kernels(&self) -> &Kernels;

    /// Minimum similarity for two vectors to be considered equal.
    fn threshold(&self) -> f64 {
        DEFAULT_THRESHOLD
    }

    /// Similarity score, cosine unless overridden.
    fn similarity(&self, a: &VectorObject, b: &VectorObject) -> f64 {
        self.cosine(a, b)
    }

    fn cosine(&self, a: &VectorObject, b: &VectorObject) -> f64 {
        self.kernels().cos(a.bytes(), b.bytes())
    }

    fn euclidean(&self, a: &VectorObject, b: &VectorObject) -> f64 {
        self.kernels().ecld(a.bytes(), a.scale(), b.bytes(), b.scale())
    }

    /// Scaled dot product.
    fn dot(&self, a: &VectorObject, b: &VectorObject) -> f64 {
        self.kernels().dp(a.bytes(), b.bytes()) * a.scale() as f64 * b.scale() as f64
    }

    fn magnitude(&self, a: &VectorObject) -> f64 {
        self.kernels().ssq(a.bytes()).sqrt() * a.scale() as f64
    }

    /// Jaccard index of the two sign fingerprints.
    fn jaccard(&self, a: &VectorObject, b: &VectorObject) -> f64 {
        let (fa, fb) = (a.fingerprint(), b.fingerprint());
        let union = (fa | fb).count_ones();
        if union == 0 {
            return 0.0;
        }
        (fa & fb).count_ones() as f64 / union as f64
    }

    /// Hamming distance between the two sign fingerprints.
    fn hamming(&self, a: &VectorObject, b: &VectorObject) -> i64 {
        (a.fingerprint() ^ b.fingerprint()).count_ones() as i64
    }

    fn matches(&self, a: &VectorObject, b: &VectorObject) -> bool {
        self.similarity(a, b) >= self.threshold()
    }

    /// Matching vectors are equal; otherwise the larger magnitude wins.
    fn compare(&self, a: &VectorObject, b: &VectorObject) -> Ordering {
        if self.matches(a, b) {
            return Ordering::Equal;
        }
        self.magnitude(a).partial_cmp(&self.magnitude(b)).unwrap_or(Ordering::Equal)
    }

    /// Element-wise sum or difference. `None` when the lengths differ.
    fn vector_arithmetic(&self, a: &VectorObject, b: &VectorObject, subtract: bool) -> Option<VectorObject> {
        if a.len() != b.len() {
            return None;
        }
        let sign = if subtract { -1.0 } else { 1.0 };
        let values: Vec<f32> = a
            .to_f32()
            .into_iter()
            .zip(b.to_f32())
            .map(|(x, y)| x + sign * y)
            .collect();
        Some(VectorObject::from_f32(&values))
    }

    fn scalar_multiply(&self, a: &VectorObject, factor: f64) -> VectorObject {
        let scale = (a.scale() as f64 * factor.abs()) as f32;
        if factor < 0.0 {
            let elements = a.elements().iter().map(|&e| e.saturating_neg()).collect();
            VectorObject::new(elements, scale)
        } else {
            VectorObject::new(a.elements().to_vec(), scale)
        }
    }
}

/// Cosine similarity with a fixed match threshold.
#[derive(Debug, Clone, Copy)]
pub struct CosineSimilarity {
    threshold: f64,
    kernels: Kernels,
}

impl CosineSimilarity {
    pub fn new(threshold: f64, kernels: Kernels) -> Self {
        Self { threshold, kernels }
    }
}

impl Default for CosineSimilarity {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, Kernels::detect())
    }
}

impl Similarity for CosineSimilarity {
    fn kernels(&self) -> &Kernels {
        &self.kernels
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
