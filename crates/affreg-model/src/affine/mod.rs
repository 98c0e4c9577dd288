pub mod network;
pub mod spatial_transformer;

pub use network::{AffineNetwork, AffineNetworkConfig};
pub use spatial_transformer::{affine_grid, theta_batch, AffineSpatialTransformer};
