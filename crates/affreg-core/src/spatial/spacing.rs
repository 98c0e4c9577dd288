//! Spacing between adjacent voxels along each index axis.

use super::Vector;

/// Physical distance between neighbouring voxels, one component per index axis `(x, y, z)`.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Same spacing along every axis.
    pub fn uniform(value: f64) -> Self {
        Self::new([value; D])
    }

    pub fn is_uniform(&self) -> bool {
        (1..D).all(|i| (self[i] - self[0]).abs() < 1e-9)
    }
}
