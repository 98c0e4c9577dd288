use affreg_core::image::Image;
use affreg_core::spatial::{Direction, Point, Spacing};
use affreg_core::transform::AffineTransform;
use affreg_registration::metric::{MeanSquaredError, NormalizedCrossCorrelation};
use affreg_registration::multires::{MultiResolutionRegistration, RegistrationSchedule};
use affreg_registration::optimizer::AdamOptimizer;
use affreg_registration::registration::Registration;
use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;

type B = Autodiff<NdArray<f32>>;

/// Gaussian ellipsoid sampled on a `d³` grid with unit spacing at the origin.
fn ellipsoid(d: usize, c: [f32; 3], r: [f32; 3]) -> Image<B, 3> {
    let device = Default::default();
    let mut data = Vec::with_capacity(d * d * d);
    for z in 0..d {
        for y in 0..d {
            for x in 0..d {
                let dx = x as f32 - c[0];
                let dy = y as f32 - c[1];
                let dz = z as f32 - c[2];
                let val = (-(dx * dx) / (2.0 * r[0] * r[0])
                    - (dy * dy) / (2.0 * r[1] * r[1])
                    - (dz * dz) / (2.0 * r[2] * r[2]))
                    .exp();
                data.push(val);
            }
        }
    }
    let tensor = Tensor::<B, 3>::from_data(TensorData::new(data, [d, d, d]), &device);
    Image::new(tensor, Point::new([0.0, 0.0, 0.0]), Spacing::new([1.0, 1.0, 1.0]), Direction::identity()).unwrap()
}

fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

#[test]
fn test_registration_affine_translation() {
    let device = Default::default();
    let fixed = ellipsoid(20, [10.0, 10.0, 10.0], [2.0, 3.0, 4.0]);
    let moving = ellipsoid(20, [11.0, 12.0, 13.0], [2.0, 3.0, 4.0]);

    let center = Tensor::<B, 1>::from_floats([10.0, 10.0, 10.0], &device);
    let transform = AffineTransform::<B, 3>::identity(Some(center), &device);

    let mut registration = Registration::new(AdamOptimizer::new(1e-1), MeanSquaredError::new());
    let result = registration.execute(&fixed, &moving, transform, 300, 1e-1).unwrap();

    // fixed points map onto moving points, so the translation is the centre shift
    let t = values(result.translation());
    assert!((t[0] - 1.0).abs() < 0.1, "Translation X error: {}", t[0]);
    assert!((t[1] - 2.0).abs() < 0.1, "Translation Y error: {}", t[1]);
    assert!((t[2] - 3.0).abs() < 0.1, "Translation Z error: {}", t[2]);
}

#[test]
fn test_registration_affine_scaling() {
    let device = Default::default();
    // fixed radii are twice the moving radii, so T(x) = c + 0.5 (x - c)
    let fixed = ellipsoid(20, [10.0, 10.0, 10.0], [4.0, 6.0, 8.0]);
    let moving = ellipsoid(20, [10.0, 10.0, 10.0], [2.0, 3.0, 4.0]);

    let center = Tensor::<B, 1>::from_floats([10.0, 10.0, 10.0], &device);
    let transform = AffineTransform::<B, 3>::identity(Some(center), &device);

    let mut registration = Registration::new(AdamOptimizer::new(1e-2), MeanSquaredError::new());
    let result = registration.execute(&fixed, &moving, transform, 500, 1e-2).unwrap();

    let m = values(result.matrix());
    assert!((m[0] - 0.5).abs() < 0.1, "Scale X error: {}", m[0]);
    assert!((m[4] - 0.5).abs() < 0.1, "Scale Y error: {}", m[4]);
    assert!((m[8] - 0.5).abs() < 0.1, "Scale Z error: {}", m[8]);
    assert!(m[1].abs() < 0.2);
    assert!(m[2].abs() < 0.2);
}

#[test]
fn test_multires_ncc_translation() {
    let device = Default::default();
    let fixed = ellipsoid(24, [12.0, 12.0, 12.0], [3.0, 4.0, 5.0]);
    let moving = ellipsoid(24, [14.0, 11.0, 13.5], [3.0, 4.0, 5.0]);

    let center = Tensor::<B, 1>::from_floats([12.0, 12.0, 12.0], &device);
    let transform = AffineTransform::<B, 3>::identity(Some(center), &device);

    let schedule = RegistrationSchedule::<3>::new(2)
        .with_iterations(vec![150, 150])
        .unwrap()
        .with_learning_rates(vec![1e-1, 5e-2])
        .unwrap();
    let mut registration = MultiResolutionRegistration::new(NormalizedCrossCorrelation::new());
    let result = registration
        .execute(&fixed, &moving, transform, AdamOptimizer::new, &schedule)
        .unwrap();

    assert_eq!(registration.level_losses().len(), 2);
    let last = registration.level_losses()[1].last().copied().unwrap();
    assert!(last < -0.95, "final NCC loss {}", last);

    // the ellipsoid centre is mapped onto the moving centre
    let m = result.to_homogeneous().unwrap();
    let mapped = m.transform_point(&nalgebra::Point3::new(12.0, 12.0, 12.0));
    assert!((mapped.x - 14.0).abs() < 0.3, "x {}", mapped.x);
    assert!((mapped.y - 11.0).abs() < 0.3, "y {}", mapped.y);
    assert!((mapped.z - 13.5).abs() < 0.3, "z {}", mapped.z);
}
