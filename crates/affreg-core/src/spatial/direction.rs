//! Direction cosine matrices describing image orientation.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::Vector;

/// Orientation of the image axes: column `i` is the world direction of index axis `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Create an identity direction matrix (axes aligned with world axes).
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Whether the matrix is orthonormal within a small tolerance.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        (0..D).all(|i| {
            (0..D).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < 1e-6
            })
        })
    }

    /// Try to compute the inverse of the direction matrix.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl Direction<3> {
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_orthogonality() {
        assert!(Direction::<3>::identity().is_orthogonal());

        // 90 degrees about z
        let mut rot = Direction::<3>::identity();
        rot[(0, 0)] = 0.0;
        rot[(0, 1)] = -1.0;
        rot[(1, 0)] = 1.0;
        rot[(1, 1)] = 0.0;
        assert!(rot.is_orthogonal());
        assert!((rot.determinant() - 1.0).abs() < 1e-12);

        let mut sheared = Direction::<3>::identity();
        sheared[(0, 1)] = 0.5;
        assert!(!sheared.is_orthogonal());
    }

    #[test]
    fn test_direction_inverse() {
        let mut rot = Direction::<2>::identity();
        rot[(0, 0)] = 0.0;
        rot[(0, 1)] = -1.0;
        rot[(1, 0)] = 1.0;
        rot[(1, 1)] = 0.0;
        let inv = rot.try_inverse().unwrap();
        let v = inv * (rot * Vector::new([1.0, 2.0]));
        assert!((v[0] - 1.0).abs() < 1e-12 && (v[1] - 2.0).abs() < 1e-12);
    }
}
