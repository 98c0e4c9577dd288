use affreg_core::image::{Image, VolumeGeometry};
use affreg_core::spatial::{Direction, Point, Spacing};
use affreg_core::transform::convention::{theta_to_world, world_to_theta, AffineParameters};
use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use proptest::prelude::*;

type Backend = NdArray<f32>;

fn rotation(ax: f64, ay: f64, az: f64) -> Direction<3> {
    let params = AffineParameters {
        scales: [1.0; 3],
        degrees: [ax, ay, az],
        translation: [0.0; 3],
    };
    Direction(params.rotation())
}

proptest! {
    #[test]
    fn test_coordinate_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        ax in -180.0f64..180.0, ay in -180.0f64..180.0, az in -180.0f64..180.0,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0
    ) {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([2, 2, 2], &device);
        let image = Image::new(
            data,
            Point::new([ox, oy, oz]),
            Spacing::new([sx, sy, sz]),
            rotation(ax, ay, az),
        ).unwrap();

        let point = Point::new([px, py, pz]);
        let index = image.transform_physical_point_to_continuous_index(&point);
        let recovered = image.transform_continuous_index_to_physical_point(&index);
        prop_assert!(point.distance(&recovered) < 1e-6);

        // the detached geometry agrees with the image
        let via_geometry = image.geometry().point_to_index(&point).unwrap();
        prop_assert!(index.distance(&via_geometry) < 1e-6);
    }

    #[test]
    fn test_tensor_batch_consistency(
        ox in -10.0f64..10.0,
        sx in 0.5f64..2.0,
        az in -90.0f64..90.0,
        px in -10.0f64..10.0
    ) {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([2, 2, 2], &device);
        let image = Image::new(
            data,
            Point::new([ox, -ox, 0.5 * ox]),
            Spacing::new([sx, 1.0, 2.0 * sx]),
            rotation(0.0, 0.0, az),
        ).unwrap();

        let point = Point::new([px, 2.0 * px, -px]);
        let expected = image.transform_physical_point_to_continuous_index(&point);

        let points = Tensor::<Backend, 2>::from_floats(
            [[point[0] as f32, point[1] as f32, point[2] as f32]],
            &device,
        );
        let indices = image.world_to_index_tensor(points.clone()).into_data().to_vec::<f32>().unwrap();
        for i in 0..3 {
            prop_assert!((indices[i] - expected[i] as f32).abs() < 1e-3);
        }

        let back = image
            .index_to_world_tensor(image.world_to_index_tensor(points))
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for i in 0..3 {
            prop_assert!((back[i] - point[i] as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn test_theta_world_roundtrip(
        nx in 2usize..40, ny in 2usize..40, nz in 2usize..40,
        sx in 0.5f64..3.0, sz in 0.5f64..3.0,
        ax in -30.0f64..30.0, ay in -30.0f64..30.0, az in -30.0f64..30.0,
        scale in 0.8f64..1.2,
        tx in -20.0f64..20.0, ty in -20.0f64..20.0
    ) {
        let fixed = VolumeGeometry::new(
            [nx, ny, nz],
            Point::new([-40.0, 10.0, 3.0]),
            Spacing::new([sx, 1.0, sz]),
            rotation(0.0, 0.0, 15.0),
        );
        let moving = VolumeGeometry::new(
            [ny + 3, nx, nz + 1],
            Point::new([-35.0, 8.0, 0.0]),
            Spacing::new([1.0, sx, 1.5]),
            Direction::identity(),
        );
        let params = AffineParameters {
            scales: [scale, 1.0 / scale, 1.0],
            degrees: [ax, ay, az],
            translation: [tx, ty, 0.0],
        };
        let world = params.to_matrix(&fixed.center());

        let theta = world_to_theta(&world, &fixed, &moving).unwrap();
        let back = theta_to_world(&theta, &fixed, &moving).unwrap();
        prop_assert!((back - world).abs().max() < 1e-8);
    }
}
