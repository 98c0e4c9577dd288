//! Point type for representing positions in physical or index space.

use nalgebra::Point as NaPoint;
use serde::{Deserialize, Serialize};
use super::Vector;

/// A point in D-dimensional space (millimetres for world points, voxels for indices).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    /// Create a new point from coordinates.
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    /// The point with all coordinates zero.
    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }

    /// Coordinates as a fixed-size array.
    pub fn to_array(&self) -> [f64; D] {
        std::array::from_fn(|i| self.0.coords[i])
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.0 - other.0).norm()
    }

    pub fn inner(&self) -> &NaPoint<f64, D> {
        &self.0
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0.coords[index]
    }
}

impl<const D: usize> std::ops::Sub for Point<D> {
    type Output = Vector<D>;

    fn sub(self, other: Self) -> Self::Output {
        Vector(self.0.coords - other.0.coords)
    }
}

impl<const D: usize> std::ops::Add<Vector<D>> for Point<D> {
    type Output = Self;

    fn add(self, vector: Vector<D>) -> Self::Output {
        Self(self.0 + vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Point3 = Point<3>;
    type Vector3 = Vector<3>;

    #[test]
    fn test_point_arithmetic() {
        let p1 = Point3::new([5.0, 5.0, 5.0]);
        let p2 = Point3::new([2.0, 3.0, 4.0]);
        assert_eq!(p1 - p2, Vector3::new([3.0, 2.0, 1.0]));
        assert_eq!(p2 + Vector3::new([1.0, 1.0, 1.0]), Point3::new([3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_point_distance() {
        let a = Point3::new([0.0, 0.0, 0.0]);
        let b = Point3::new([3.0, 4.0, 0.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(b.to_array(), [3.0, 4.0, 0.0]);
    }
}
