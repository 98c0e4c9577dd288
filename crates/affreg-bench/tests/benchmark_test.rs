use affreg_bench::{register_classical, Benchmark, BenchmarkConfig, BenchmarkReport, ClassicalConfig, SimilarityMetric};
use affreg_core::image::Image;
use affreg_core::spatial::{Direction, Point, Spacing};
use affreg_core::transform::AffineParameters;
use affreg_io::{LoadedPair, Preprocessing};
use affreg_model::{AffineNetworkConfig, AffinePredictor, PaddingMode, Perturbation, RandomAffineConfig};
use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;

type B = NdArray<f32>;
type AD = Autodiff<NdArray<f32>>;

fn blob<BB: Backend>(n: usize) -> Image<BB, 3> {
    let device = Default::default();
    let c = (n as f32 - 1.0) / 2.0;
    let r = n as f32 / 4.0;
    let mut values = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let dx = (x as f32 - c) / (1.3 * r);
                let dy = (y as f32 - c) / r;
                let dz = (z as f32 - c) / (0.8 * r);
                values.push((-(dx * dx + dy * dy + dz * dz)).exp());
            }
        }
    }
    let data = Tensor::<BB, 1>::from_floats(values.as_slice(), &device).reshape([n, n, n]);
    Image::new(data, Point::new([-10.0, -10.0, -10.0]), Spacing::uniform(1.0), Direction::identity()).unwrap()
}

fn untrained_predictor() -> AffinePredictor<B> {
    let model = AffineNetworkConfig::new()
        .with_channels(vec![4])
        .with_hidden(4)
        .init::<B>(&Default::default());
    AffinePredictor::new(model, Preprocessing::new().with_target_shape([12, 12, 12]), PaddingMode::Zeros)
}

fn quick_classical() -> ClassicalConfig {
    ClassicalConfig::new().with_levels(2).with_iterations(10).with_patience(0)
}

#[test]
fn test_benchmark_report_shape() {
    let pairs = vec![
        LoadedPair::<AD> {
            name: "a".into(),
            fixed: blob(12),
            moving: blob(12),
        },
        LoadedPair::<AD> {
            name: "b".into(),
            fixed: blob(12),
            moving: blob(12),
        },
    ];
    let config = BenchmarkConfig::new()
        .with_cases_per_pair(2)
        .with_classical(quick_classical())
        .with_augmentation(RandomAffineConfig::new().with_degrees(5.0).with_translation(2.0));

    let benchmark = Benchmark::<AD>::new(config, untrained_predictor()).unwrap();
    let report = benchmark.run(&pairs).unwrap();

    assert_eq!(report.cases.len(), 4);
    assert_eq!(report.learned.tre_mm.count, 4);
    assert_eq!(report.classical.seconds.count, 4);
    assert_eq!(report.cases[2].pair, "b");
    assert_eq!(report.cases[3].case, 1);
    // the untrained network predicts the identity
    for case in &report.cases {
        assert!((case.learned.tre_mm - case.initial.tre_mm).abs() < 1e-3);
        assert!(case.initial.tre_mm > 0.0);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();
    let back = BenchmarkReport::read_json(&path).unwrap();
    assert_eq!(back.cases.len(), 4);
}

#[test]
fn test_identity_case_has_no_error() {
    let pair = LoadedPair::<AD> {
        name: "same".into(),
        fixed: blob(12),
        moving: blob(12),
    };
    let benchmark = Benchmark::<AD>::new(
        BenchmarkConfig::new().with_classical(quick_classical()),
        untrained_predictor(),
    )
    .unwrap();

    let result = benchmark.run_case(&pair, 0, AffineParameters::identity()).unwrap();
    assert!(result.initial.tre_mm < 1e-9);
    assert!(result.learned.tre_mm < 1e-3);
    assert!(result.learned.ncc > 0.999);
    assert!(result.classical.tre_mm < 0.5, "classical TRE {}", result.classical.tre_mm);
}

#[test]
fn test_classical_recovers_translation() {
    let fixed = blob::<AD>(16);
    let params = AffineParameters {
        translation: [1.5, -1.0, 0.5],
        ..AffineParameters::identity()
    };
    let geometry = fixed.geometry();
    let perturbation = Perturbation::new(params, &geometry).unwrap();
    let moving = perturbation.apply(&fixed, PaddingMode::Zeros).unwrap();
    let truth = perturbation.target_world().unwrap();

    let classical = ClassicalConfig::new()
        .with_levels(2)
        .with_iterations(150)
        .with_learning_rate(0.05)
        .with_translation_scale(1.0)
        .with_metric(SimilarityMetric::Mse)
        .with_patience(0);
    let estimated = register_classical(&classical, &fixed, &moving).unwrap();

    let errors = affreg_bench::transform_errors(&estimated, &truth, &geometry, &geometry).unwrap();
    let initial = affreg_bench::transform_errors(&nalgebra::Matrix4::identity(), &truth, &geometry, &geometry).unwrap();
    assert!(errors.tre_mm < initial.tre_mm / 2.0, "{} vs {}", errors.tre_mm, initial.tre_mm);
}

#[test]
fn test_classical_recovers_translation_with_default_scale() {
    let fixed = blob::<AD>(16);
    let params = AffineParameters {
        translation: [-1.5, 1.0, 1.0],
        ..AffineParameters::identity()
    };
    let geometry = fixed.geometry();
    let perturbation = Perturbation::new(params, &geometry).unwrap();
    let moving = perturbation.apply(&fixed, PaddingMode::Zeros).unwrap();
    let truth = perturbation.target_world().unwrap();

    let classical = ClassicalConfig::new()
        .with_levels(2)
        .with_iterations(150)
        .with_metric(SimilarityMetric::Mse)
        .with_patience(0);
    assert_eq!(classical.translation_scale, 10.0);
    let estimated = register_classical(&classical, &fixed, &moving).unwrap();

    let errors = affreg_bench::transform_errors(&estimated, &truth, &geometry, &geometry).unwrap();
    let initial = affreg_bench::transform_errors(&nalgebra::Matrix4::identity(), &truth, &geometry, &geometry).unwrap();
    assert!(errors.tre_mm < initial.tre_mm / 2.0, "{} vs {}", errors.tre_mm, initial.tre_mm);
}
