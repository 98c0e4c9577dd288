//! Image type with physical metadata and coordinate transformations.
//!
//! This module provides the Image struct which represents medical images
//! with tensor data and physical space metadata (origin, spacing, direction).

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::geometry::VolumeGeometry;
use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Medical image with physical metadata.
///
/// The Image type combines tensor data with the metadata that describes how voxel
/// indices map to physical coordinates.
///
/// # Type Parameters
/// * `B` - The backend for tensor operations
/// * `D` - The dimensionality of the image (2 or 3)
///
/// # Coordinate Systems
/// * **Index Space**: continuous voxel indices ordered `(x, y, z)`
/// * **Physical Space**: continuous coordinates in millimetres
///
/// Tensor dimensions are stored in reverse, `[z, y, x]`.
///
/// # Examples
/// ```rust
/// use affreg_core::Image;
/// use affreg_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 12, 14], &device);
/// let image = Image::new(
///     data,
///     Point3::new([0.0, 0.0, 0.0]),
///     Spacing3::new([1.0, 1.0, 2.0]),
///     Direction3::identity(),
/// )
/// .unwrap();
/// assert_eq!(image.geometry().size, [14, 12, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    inverse_direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    ///
    /// Fails when the spacing is not strictly positive or the direction matrix is singular.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Result<Self> {
        if (0..D).any(|i| !(spacing[i].is_finite() && spacing[i] > 0.0)) {
            return Err(CoreError::InvalidSpacing {
                spacing: spacing.to_array().to_vec(),
            });
        }
        let inverse_direction = direction
            .try_inverse()
            .ok_or_else(|| CoreError::singular("image direction"))?;
        Ok(Self {
            data,
            origin,
            spacing,
            direction,
            inverse_direction,
        })
    }

    /// Same metadata, different voxel data.
    pub fn with_data(&self, data: Tensor<B, D>) -> Result<Self> {
        if data.dims() != self.shape() {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape().to_vec(),
                actual: data.dims().to_vec(),
            });
        }
        Ok(Self {
            data,
            ..self.clone()
        })
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    /// Get the origin (physical coordinate of first voxel).
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Get the spacing (physical distance between voxels).
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// Get the direction (orientation matrix).
    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Tensor shape, `[z, y, x]` for volumes.
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Convert a physical point to a continuous index:
    /// `index = (Direction^-1 * (point - origin)) / spacing`.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let rotated = self.inverse_direction * (*point - self.origin);
        let mut index = Point::<D>::origin();
        for i in 0..D {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Convert a continuous index to a physical point:
    /// `point = origin + Direction * (index * spacing)`.
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        let mut scaled_index = Vector::<D>::zeros();
        for i in 0..D {
            scaled_index[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled_index
    }

    /// Batch transform physical points `[N, D]` to continuous indices `[N, D]`.
    ///
    /// ```rust
    /// use affreg_core::Image;
    /// use affreg_core::spatial::{Point3, Spacing3, Direction3};
    /// use burn::tensor::Tensor;
    /// use burn_ndarray::NdArray;
    ///
    /// type Backend = NdArray<f32>;
    /// let device = Default::default();
    /// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
    /// let image = Image::new(
    ///     data,
    ///     Point3::new([5.0, 0.0, 0.0]),
    ///     Spacing3::uniform(2.0),
    ///     Direction3::identity(),
    /// )
    /// .unwrap();
    ///
    /// let points = Tensor::<Backend, 2>::from_floats([[9.0, 4.0, 2.0]], &device);
    /// let indices = image.world_to_index_tensor(points);
    /// assert_eq!(indices.into_data().to_vec::<f32>().unwrap(), vec![2.0, 2.0, 1.0]);
    /// ```
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin = self.origin_tensor(&device);

        // I = (P - O) @ T with T_rc = (Dir^-1)_cr / S_c
        let mut t_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t_data.push((self.inverse_direction[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

        (points - origin).matmul(t)
    }

    /// Batch transform continuous indices `[N, D]` to physical points `[N, D]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin = self.origin_tensor(&device);

        // P = O + I @ M with M_rc = S_r * Dir_cr
        let mut m_data = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

        indices.matmul(m) + origin
    }

    fn origin_tensor(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([D])), device).reshape([1, D])
    }
}

impl<B: Backend> Image<B, 3> {
    /// Build a volume from data and a detached geometry.
    pub fn from_geometry(data: Tensor<B, 3>, geometry: &VolumeGeometry) -> Result<Self> {
        if data.dims() != geometry.shape() {
            return Err(CoreError::ShapeMismatch {
                expected: geometry.shape().to_vec(),
                actual: data.dims().to_vec(),
            });
        }
        Self::new(data, geometry.origin, geometry.spacing, geometry.direction)
    }

    /// Metadata of this volume without its voxel data.
    pub fn geometry(&self) -> VolumeGeometry {
        let [z, y, x] = self.shape();
        VolumeGeometry::new([x, y, z], self.origin, self.spacing, self.direction)
    }
}
