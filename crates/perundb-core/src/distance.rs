//! Distance metrics for vector similarity.

use serde::{Deserialize, Serialize};

/// Distance metric used by the ANN indexes.
///
/// Values are oriented so that **smaller means closer**, the convention
/// shared by both index kinds and by the result ordering of searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance. The square root is never taken; it does
    /// not change the ordering and ANN libraries conventionally report the
    /// squared form.
    L2,
}

impl DistanceMetric {
    /// Computes the distance between two vectors.
    ///
    /// Callers validate vector dimensions at the index boundary; a length
    /// mismatch here is an internal invariant violation checked in debug
    /// builds only.
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

        match self {
            Self::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_is_squared() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        let d = DistanceMetric::L2.distance(&a, &b);
        assert!((d - 25.0).abs() < 1e-6);
    }

    #[test]
    fn l2_of_identical_vectors_is_zero() {
        let v = [0.5, -1.5, 2.0];
        assert!(DistanceMetric::L2.distance(&v, &v).abs() < 1e-9);
    }
}
