//! Image types and operations.
//!
//! An [`Image`] is a tensor plus the metadata mapping voxel indices to millimetres;
//! [`VolumeGeometry`] is that metadata on its own, detached from any backend.

pub mod image;
pub mod geometry;
pub mod grid;

pub use image::Image;
pub use geometry::VolumeGeometry;
pub use grid::generate_grid;
