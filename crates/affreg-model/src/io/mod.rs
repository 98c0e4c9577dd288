pub mod adapter;

pub use adapter::{image_to_tensor, images_to_batch, pair_input};
