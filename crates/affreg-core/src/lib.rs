//! Core types for affine registration of 3-D medical volumes.
//!
//! Images carry their physical metadata (origin, spacing, direction). Transforms,
//! interpolators and filters operate on burn tensors, and the [`transform::convention`]
//! module converts between millimetre-space matrices and normalised sampling grids.

pub mod error;
pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;

pub use error::{CoreError, Result};
pub use image::{Image, VolumeGeometry};
pub use spatial::{Point, Vector, Spacing, Direction};
