//! Intensity rescaling to `[0, 1]`.

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::Image;

/// How voxel intensities are mapped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IntensityNormalization {
    /// Leave intensities untouched.
    None,
    /// Map the minimum to 0 and the maximum to 1.
    #[default]
    MinMax,
    /// Map the given percentiles (0-100) to 0 and 1 and clip outside.
    Percentile { lower: f64, upper: f64 },
}

impl IntensityNormalization {
    pub fn apply<B: Backend, const D: usize>(&self, image: &Image<B, D>) -> Result<Image<B, D>> {
        let data = image.data().clone();
        let (low, high) = match *self {
            Self::None => return Ok(image.clone()),
            Self::MinMax => (
                data.clone().min().into_scalar().elem::<f64>(),
                data.clone().max().into_scalar().elem::<f64>(),
            ),
            Self::Percentile { lower, upper } => {
                if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) || lower >= upper {
                    return Err(CoreError::invalid_parameter(
                        "percentile",
                        format!("expected 0 <= lower < upper <= 100, got {lower} and {upper}"),
                    ));
                }
                let mut values = data
                    .clone()
                    .into_data()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .map_err(|e| CoreError::TensorData(format!("{e:?}")))?;
                values.sort_by(|a, b| a.total_cmp(b));
                (percentile(&values, lower), percentile(&values, upper))
            }
        };

        let range = high - low;
        let scaled = if range <= f64::EPSILON {
            data.zeros_like()
        } else {
            ((data - low) / range).clamp(0.0, 1.0)
        };
        image.with_data(scaled)
    }
}

/// Linear-interpolated percentile of sorted values.
fn percentile(sorted: &[f32], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, Point, Spacing};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn image(values: &[f32]) -> Image<TestBackend, 3> {
        let device = Default::default();
        let data = Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([1, 1, values.len()]);
        Image::new(data, Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap()
    }

    fn values(image: &Image<TestBackend, 3>) -> Vec<f32> {
        image.data().clone().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_min_max() {
        let out = IntensityNormalization::MinMax.apply(&image(&[10.0, 20.0, 30.0])).unwrap();
        assert_eq!(values(&out), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_constant_image_maps_to_zero() {
        let out = IntensityNormalization::MinMax.apply(&image(&[7.0; 4])).unwrap();
        assert_eq!(values(&out), vec![0.0; 4]);
    }

    #[test]
    fn test_percentile_clips_outliers() {
        let mut input: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        input[100] = 10_000.0;
        let out = IntensityNormalization::Percentile { lower: 0.0, upper: 99.0 }
            .apply(&image(&input))
            .unwrap();
        let out = values(&out);
        assert_eq!(out[0], 0.0);
        assert!((out[50] - 50.0 / 99.0).abs() < 1e-5);
        assert_eq!(out[100], 1.0);

        assert!(IntensityNormalization::Percentile { lower: 60.0, upper: 40.0 }
            .apply(&image(&input))
            .is_err());
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&IntensityNormalization::Percentile { lower: 1.0, upper: 99.0 }).unwrap();
        assert_eq!(json, r#"{"mode":"percentile","lower":1.0,"upper":99.0}"#);
    }
}
