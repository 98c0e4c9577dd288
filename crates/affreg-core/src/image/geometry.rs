//! Backend-independent description of a volume's sampling grid.
//!
//! `VolumeGeometry` is what survives when the voxel data is stripped from an image:
//! the number of voxels along each index axis and the mapping from voxel indices to
//! physical millimetres. All coordinate-convention conversions are expressed in terms
//! of the homogeneous matrices exposed here.

use nalgebra::{Matrix3, Matrix4, Vector3 as NaVector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing};

/// Size and physical placement of a 3-D voxel grid.
///
/// `size`, `spacing` and every index are ordered `(x, y, z)`, the reverse of the
/// `[z, y, x]` tensor layout used by [`crate::Image`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    pub size: [usize; 3],
    pub origin: Point<3>,
    pub spacing: Spacing<3>,
    pub direction: Direction<3>,
}

impl VolumeGeometry {
    pub fn new(size: [usize; 3], origin: Point<3>, spacing: Spacing<3>, direction: Direction<3>) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction,
        }
    }

    /// Unit spacing, identity direction and zero origin for a `[z, y, x]` tensor shape.
    pub fn from_shape(shape: [usize; 3]) -> Self {
        Self::new(
            [shape[2], shape[1], shape[0]],
            Point::origin(),
            Spacing::uniform(1.0),
            Direction::identity(),
        )
    }

    /// Tensor shape `[z, y, x]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.size[2], self.size[1], self.size[0]]
    }

    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Check that spacing is positive and the direction matrix invertible.
    pub fn validate(&self) -> Result<()> {
        if (0..3).any(|i| !(self.spacing[i].is_finite() && self.spacing[i] > 0.0)) {
            return Err(CoreError::InvalidSpacing {
                spacing: self.spacing.to_array().to_vec(),
            });
        }
        if self.direction.determinant().abs() < 1e-12 {
            return Err(CoreError::singular("direction matrix"));
        }
        Ok(())
    }

    /// Homogeneous index → world matrix: `[Dir · diag(spacing) | origin]`.
    pub fn index_to_world(&self) -> Matrix4<f64> {
        let scaled = self.direction.0 * Matrix3::from_diagonal(&self.spacing.0);
        let mut m = scaled.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.origin.0.coords);
        m
    }

    /// Homogeneous world → index matrix.
    pub fn world_to_index(&self) -> Result<Matrix4<f64>> {
        self.index_to_world()
            .try_inverse()
            .ok_or_else(|| CoreError::singular("index-to-world matrix"))
    }

    /// Homogeneous matrix taking corner-aligned normalised coordinates in `[-1, 1]` to
    /// continuous voxel indices: `i = (n + 1) (s - 1) / 2`.
    pub fn normalized_to_index(&self) -> Result<Matrix4<f64>> {
        let mut m = Matrix4::identity();
        for axis in 0..3 {
            let size = self.size[axis];
            if size < 2 {
                return Err(CoreError::DegenerateAxis { axis, size });
            }
            let half = (size as f64 - 1.0) / 2.0;
            m[(axis, axis)] = half;
            m[(axis, 3)] = half;
        }
        Ok(m)
    }

    /// Homogeneous matrix from continuous voxel index to normalised coordinates.
    pub fn index_to_normalized(&self) -> Result<Matrix4<f64>> {
        self.normalized_to_index()?
            .try_inverse()
            .ok_or_else(|| CoreError::singular("normalized-to-index matrix"))
    }

    /// Physical coordinate of a continuous `(x, y, z)` index.
    pub fn index_to_point(&self, index: &Point<3>) -> Point<3> {
        Point(self.index_to_world().transform_point(&index.0))
    }

    /// Continuous `(x, y, z)` index of a physical point.
    pub fn point_to_index(&self, point: &Point<3>) -> Result<Point<3>> {
        Ok(Point(self.world_to_index()?.transform_point(&point.0)))
    }

    /// Physical position of the volume centre, `index = (size - 1) / 2`.
    pub fn center(&self) -> Point<3> {
        let half = Point::new(std::array::from_fn(|i| (self.size[i] as f64 - 1.0) / 2.0));
        self.index_to_point(&half)
    }

    /// Physical positions of the eight corner voxel centres.
    pub fn corners(&self) -> Vec<Point<3>> {
        let last: [f64; 3] = std::array::from_fn(|i| self.size[i].saturating_sub(1) as f64);
        (0..8)
            .map(|bits| {
                let index = Point::new(std::array::from_fn(|axis| {
                    if bits & (1 << axis) != 0 { last[axis] } else { 0.0 }
                }));
                self.index_to_point(&index)
            })
            .collect()
    }

    /// Geometry of the same physical extent sampled on a `[z, y, x]` grid of `shape`.
    ///
    /// The first and last voxel centres keep their physical positions, so corner-aligned
    /// normalised coordinates mean the same point before and after.
    pub fn resized(&self, shape: [usize; 3]) -> Result<Self> {
        let new_size = [shape[2], shape[1], shape[0]];
        let mut spacing = self.spacing;
        for axis in 0..3 {
            for size in [self.size[axis], new_size[axis]] {
                if size < 2 {
                    return Err(CoreError::DegenerateAxis { axis, size });
                }
            }
            spacing[axis] =
                self.spacing[axis] * (self.size[axis] as f64 - 1.0) / (new_size[axis] as f64 - 1.0);
        }
        Ok(Self::new(new_size, self.origin, spacing, self.direction))
    }

    /// Physical extent between first and last voxel centres along each axis.
    pub fn extent(&self) -> NaVector3<f64> {
        NaVector3::from_fn(|i, _| self.spacing[i] * (self.size[i] as f64 - 1.0))
    }
}
