//! Distance metrics and vector normalization.
//!
//! All distances are "lower is closer":
//! - L2: squared Euclidean distance
//! - InnerProduct: `1 - <a, b>`
//! - Cosine: inner-product distance over unit-length vectors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::VectorElement;

/// Distance metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Metric {
    #[default]
    L2 = 0,
    InnerProduct = 1,
    Cosine = 2,
}

impl Metric {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::InnerProduct),
            2 => Some(Metric::Cosine),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "L2",
            Metric::InnerProduct => "IP",
            Metric::Cosine => "COSINE",
        }
    }

    /// Whether stored and query vectors are normalized before use.
    pub fn normalizes(&self) -> bool {
        matches!(self, Metric::Cosine)
    }

    /// Distance between two equal-length vectors.
    pub fn distance<T: VectorElement>(&self, a: &[T], b: &[T]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x.to_f64() - y.to_f64();
                    d * d
                })
                .sum(),
            Metric::InnerProduct | Metric::Cosine => {
                let dot: f64 = a.iter().zip(b).map(|(x, y)| x.to_f64() * y.to_f64()).sum();
                1.0 - dot
            }
        }
    }

    /// Copy `vector`, normalizing it when the metric requires unit length.
    pub fn prepare<T: VectorElement>(&self, vector: &[T]) -> Vec<T> {
        let mut owned = vector.to_vec();
        if self.normalizes() {
            normalize(&mut owned);
        }
        owned
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale `vector` to unit length in place.
///
/// Components are divided by the largest magnitude before squaring, so the
/// sum of squares never overflows even when the raw squares would exceed the
/// range of the element type. An all-zero vector is left unchanged.
pub fn normalize<T: VectorElement>(vector: &mut [T]) {
    let max_abs = vector
        .iter()
        .map(|x| x.to_f64().abs())
        .fold(0.0f64, f64::max);
    if max_abs == 0.0 || !max_abs.is_finite() {
        return;
    }

    let scaled_sum: f64 = vector
        .iter()
        .map(|x| {
            let s = x.to_f64() / max_abs;
            s * s
        })
        .sum();
    let norm = max_abs * scaled_sum.sqrt();

    for x in vector.iter_mut() {
        *x = T::from_f64(x.to_f64() / norm);
    }
}
