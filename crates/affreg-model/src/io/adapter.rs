use affreg_core::image::Image;
use anyhow::{ensure, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// A single volume as a `[1, 1, D, H, W]` network tensor.
pub fn image_to_tensor<B: Backend>(image: &Image<B, 3>) -> Tensor<B, 5> {
    let [d, h, w] = image.shape();
    image.data().clone().reshape([1, 1, d, h, w])
}

/// Stack volumes of equal shape into `[N, 1, D, H, W]`.
pub fn images_to_batch<B: Backend>(images: &[&Image<B, 3>]) -> Result<Tensor<B, 5>> {
    ensure!(!images.is_empty(), "Cannot batch empty list of images");

    let ref_shape = images[0].shape();
    for (i, img) in images.iter().enumerate().skip(1) {
        ensure!(
            img.shape() == ref_shape,
            "Image {} shape mismatch: {:?} vs {:?}",
            i,
            img.shape(),
            ref_shape
        );
    }

    Ok(Tensor::cat(images.iter().map(|img| image_to_tensor(img)).collect(), 0))
}

/// Network input `[N, 2, D, H, W]`: moving in channel 0, fixed in channel 1.
pub fn pair_input<B: Backend>(moving: Tensor<B, 5>, fixed: Tensor<B, 5>) -> Result<Tensor<B, 5>> {
    ensure!(
        moving.dims() == fixed.dims(),
        "Moving batch {:?} and fixed batch {:?} differ in shape",
        moving.dims(),
        fixed.dims()
    );
    Ok(Tensor::cat(vec![moving, fixed], 1))
}
