//! Error types for geometry and coordinate convention failures.

use thiserror::Error;

/// Errors raised by core geometry operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A matrix that has to be inverted is singular.
    #[error("Singular matrix: {context}")]
    SingularMatrix { context: String },

    /// Corner-aligned normalisation needs at least two voxels per axis.
    #[error("Axis {axis} has size {size}; at least 2 voxels are required")]
    DegenerateAxis { axis: usize, size: usize },

    /// Spacing must be strictly positive and finite.
    #[error("Invalid spacing {spacing:?}")]
    InvalidSpacing { spacing: Vec<f64> },

    /// Two shapes were expected to agree.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// Tensor contents could not be read back to the host.
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Parameters outside their admissible range.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl CoreError {
    pub fn singular(context: impl Into<String>) -> Self {
        Self::SingularMatrix { context: context.into() }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::DegenerateAxis { axis: 2, size: 1 };
        assert_eq!(
            err.to_string(),
            "Axis 2 has size 1; at least 2 voxels are required"
        );
        let err = CoreError::singular("fixed index-to-world");
        assert!(err.to_string().contains("fixed index-to-world"));
    }
}
