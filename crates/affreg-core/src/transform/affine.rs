//! Affine transform implementation.
//!
//! This module provides a trainable affine transform (linear transformation + translation).

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3 as NaVector3};

use super::trait_::Transform;
use crate::error::{CoreError, Result};
use crate::spatial::Point;

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a D×D matrix (linear transformation: rotation, scale, shear)
/// * t is a D-dimensional translation vector
/// * c is a D-dimensional fixed center of rotation/scaling
///
/// Only `A` and `t` are parameters; the centre stays fixed during optimisation.
/// The translation is stored divided by `translation_scale`, so that one optimiser step
/// moves it by millimetres while the matrix moves by a fraction of a unit.
#[derive(Module, Debug)]
pub struct AffineTransform<B: Backend, const D: usize> {
    matrix: Param<Tensor<B, 2>>,
    translation: Param<Tensor<B, 1>>,
    center: Tensor<B, 1>,
    translation_scale: f64,
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    /// Create a new affine transform from `[D, D]` matrix, `[D]` translation and `[D]` centre.
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>, center: Tensor<B, 1>) -> Self {
        Self {
            matrix: Param::from_tensor(matrix),
            translation: Param::from_tensor(translation),
            center,
            translation_scale: 1.0,
        }
    }

    /// Re-parameterise the translation in units of `scale` (mm); the mapping is unchanged.
    pub fn with_translation_scale(self, scale: f64) -> Self {
        // Rebuilt from a detached value so the new parameter is a leaf of the graph.
        let translation = self.translation.val().detach() * (self.translation_scale / scale);
        Self {
            translation: Param::from_tensor(translation),
            translation_scale: scale,
            ..self
        }
    }

    /// Create an identity affine transform around `center` (origin if `None`).
    pub fn identity(center: Option<Tensor<B, 1>>, device: &B::Device) -> Self {
        let matrix = Tensor::<B, 2>::eye(D, device);
        let translation = Tensor::<B, 1>::zeros([D], device);
        let center = center.unwrap_or_else(|| Tensor::<B, 1>::zeros([D], device));
        Self::new(matrix, translation, center)
    }

    pub fn matrix(&self) -> Tensor<B, 2> {
        self.matrix.val()
    }

    /// Translation in world units.
    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.val() * self.translation_scale
    }

    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }
}

impl<B: Backend> AffineTransform<B, 3> {
    /// Build a transform equal to the homogeneous world matrix `m`, parameterised
    /// around `center`.
    pub fn from_homogeneous(m: &Matrix4<f64>, center: &Point<3>, device: &B::Device) -> Self {
        let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let offset: NaVector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
        let c = center.0.coords;
        // A(x - c) + c + t = Ax + offset  =>  t = offset + Ac - c
        let t = offset + linear * c - c;

        let matrix_data: Vec<f32> = (0..3)
            .flat_map(|r| (0..3).map(move |col| linear[(r, col)] as f32))
            .collect();
        let matrix = Tensor::<B, 1>::from_data(TensorData::from(matrix_data.as_slice()), device).reshape([3, 3]);
        let translation = Tensor::<B, 1>::from_floats([t.x as f32, t.y as f32, t.z as f32], device);
        let center = Tensor::<B, 1>::from_floats([c.x as f32, c.y as f32, c.z as f32], device);
        Self::new(matrix, translation, center)
    }

    /// Current parameters as a homogeneous 4×4 matrix `x ↦ Ax + (c + t - Ac)`.
    pub fn to_homogeneous(&self) -> Result<Matrix4<f64>> {
        let read = |t: Tensor<B, 1>| -> Result<Vec<f64>> {
            t.into_data()
                .convert::<f64>()
                .to_vec::<f64>()
                .map_err(|e| CoreError::TensorData(format!("{e:?}")))
        };
        let a = read(self.matrix.val().reshape([9]))?;
        let t = read(self.translation())?;
        let c = read(self.center.clone())?;

        let linear = Matrix3::from_row_slice(&a);
        let c = NaVector3::new(c[0], c[1], c[2]);
        let offset = c + NaVector3::new(t[0], t[1], t[2]) - linear * c;

        let mut m = linear.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        Ok(m)
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row-vector form for [N, D] inputs: y = (x - c) @ A^T + c + t
        let c = self.center.clone().reshape([1, D]);
        let t = self.translation().reshape([1, D]);
        let a = self.matrix.val();

        (points - c.clone()).matmul(a.transpose()) + c + t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_affine_transform_identity() {
        let device = Default::default();
        let transform = AffineTransform::<TestBackend, 3>::identity(None, &device);
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);
        assert_eq!(values(transform.transform_points(points)), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_affine_transform_scale_with_center() {
        let device = Default::default();
        let matrix = Tensor::<TestBackend, 2>::eye(2, &device) * 2.0;
        let translation = Tensor::<TestBackend, 1>::zeros([2], &device);
        let center = Tensor::<TestBackend, 1>::from_floats([1.0, 1.0], &device);
        let transform = AffineTransform::<TestBackend, 2>::new(matrix, translation, center);

        // x - c = [1, 0], A(x - c) + c = [3, 1]
        let points = Tensor::<TestBackend, 2>::from_floats([[2.0, 1.0]], &device);
        let out = values(transform.transform_points(points));
        assert!((out[0] - 3.0).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_translation_scale_keeps_mapping() {
        let device = Default::default();
        let matrix = Tensor::<TestBackend, 2>::eye(3, &device);
        let translation = Tensor::<TestBackend, 1>::from_floats([10.0, -4.0, 2.0], &device);
        let center = Tensor::<TestBackend, 1>::zeros([3], &device);
        let transform = AffineTransform::<TestBackend, 3>::new(matrix, translation, center).with_translation_scale(10.0);

        let stored = transform.translation.val().into_data().to_vec::<f32>().unwrap();
        assert!((stored[0] - 1.0).abs() < 1e-6);
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 1.0]], &device);
        let out = values(transform.transform_points(points));
        assert!((out[0] - 11.0).abs() < 1e-5);
        assert!((out[1] + 3.0).abs() < 1e-5);
        assert!((out[2] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_translation_scale_is_trainable() {
        type AD = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();
        let transform = AffineTransform::<AD, 3>::identity(None, &device).with_translation_scale(10.0);

        let points = Tensor::<AD, 2>::from_floats([[1.0, 2.0, 3.0], [-1.0, 0.0, 4.0]], &device);
        let grads = transform.transform_points(points).sum().backward();

        // each of the two points contributes the scale to d(sum)/d(stored t_i)
        let grad = transform.translation.val().grad(&grads).unwrap();
        for g in grad.into_data().to_vec::<f32>().unwrap() {
            assert!((g - 20.0).abs() < 1e-4, "gradient {g}");
        }
        let grad = transform.matrix.val().grad(&grads).unwrap();
        assert_eq!(grad.dims(), [3, 3]);
    }

    #[test]
    fn test_homogeneous_roundtrip() {
        let device = Default::default();
        let mut m = Matrix4::<f64>::identity();
        m[(0, 0)] = 1.1;
        m[(0, 1)] = -0.2;
        m[(1, 0)] = 0.15;
        m[(2, 2)] = 0.9;
        m[(0, 3)] = 4.0;
        m[(1, 3)] = -2.5;
        m[(2, 3)] = 1.0;
        let center = Point::new([10.0, 12.0, 8.0]);

        let transform = AffineTransform::<TestBackend, 3>::from_homogeneous(&m, &center, &device);
        let back = transform.to_homogeneous().unwrap();
        assert!((back - m).abs().max() < 1e-5);

        // the tensor path agrees with the matrix
        let p = nalgebra::Point3::new(3.0, -1.0, 5.0);
        let expected = m.transform_point(&p);
        let points = Tensor::<TestBackend, 2>::from_floats([[3.0, -1.0, 5.0]], &device);
        let out = values(transform.transform_points(points));
        for i in 0..3 {
            assert!((out[i] as f64 - expected[i]).abs() < 1e-4);
        }
    }
}
