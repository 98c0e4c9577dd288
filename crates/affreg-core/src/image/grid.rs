use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate the continuous voxel indices of every voxel of a tensor shape.
///
/// Returns `[N, D]` with indices ordered `(x, y, ...)`, i.e. the reverse of the tensor
/// dimension order, and rows in the tensor's row-major voxel order, so row `k` belongs
/// to the `k`-th element of the flattened image.
pub fn generate_grid<B, const D: usize>(shape: [usize; D], device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
{
    let total: usize = shape.iter().product();
    let mut grid = Vec::with_capacity(total * D);
    let mut counter = [0usize; D];

    for _ in 0..total {
        grid.extend(counter.iter().rev().map(|&i| i as f32));
        // odometer increment, last tensor dimension fastest
        for dim in (0..D).rev() {
            counter[dim] += 1;
            if counter[dim] < shape[dim] {
                break;
            }
            counter[dim] = 0;
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * D])), device)
        .reshape([total, D])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_grid_order_3d() {
        let device = Default::default();
        let grid = generate_grid::<Backend, 3>([2, 2, 3], &device);
        assert_eq!(grid.dims(), [12, 3]);
        let values = grid.into_data().to_vec::<f32>().unwrap();
        // first row is the origin, second steps along x
        assert_eq!(&values[0..6], &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        // element 3 is (x=0, y=1, z=0)
        assert_eq!(&values[9..12], &[0.0, 1.0, 0.0]);
        // last element is (2, 1, 1)
        assert_eq!(&values[33..36], &[2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_grid_2d() {
        let device = Default::default();
        let grid = generate_grid::<Backend, 2>([2, 2], &device);
        let values = grid.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }
}
