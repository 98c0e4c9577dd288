//! Error types for the iterative registration baseline.

use affreg_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Loss became NaN or infinite.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure inside an image or geometry operation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::invalid_configuration("no levels");
        assert_eq!(err.to_string(), "Invalid configuration: no levels");
        let err = RegistrationError::numerical_instability("loss is NaN");
        assert_eq!(err.to_string(), "Numerical instability: loss is NaN");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let core = CoreError::singular("direction");
        let expected = core.to_string();
        let err: RegistrationError = core.into();
        assert!(matches!(err, RegistrationError::Core(_)));
        assert_eq!(err.to_string(), expected);
    }
}
