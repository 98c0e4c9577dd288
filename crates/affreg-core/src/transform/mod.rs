//! Transform types and coordinate conventions.

pub mod trait_;
pub mod affine;
pub mod convention;

pub use trait_::Transform;
pub use affine::AffineTransform;
pub use convention::{
    identity_theta, invert_theta, mean_point_distance, theta_from_row_major, theta_to_homogeneous,
    theta_to_row_major, theta_to_world, world_to_theta, AffineParameters,
};
