//! Error types shared by every index kind.

use thiserror::Error;

/// Unified error type for type-level validation.
#[derive(Debug, Error)]
pub enum VecSimError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl VecSimError {
    /// Check that `actual` is a usable vector length for an index of `expected` dimension.
    pub fn check_dimension(expected: usize, actual: usize) -> Result<(), VecSimError> {
        if expected == 0 || actual == 0 {
            return Err(VecSimError::InvalidInput(
                "vector dimension must be non-zero".to_string(),
            ));
        }
        if expected != actual {
            return Err(VecSimError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(VecSimError::check_dimension(4, 4).is_ok());
        assert!(matches!(
            VecSimError::check_dimension(4, 3),
            Err(VecSimError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            VecSimError::check_dimension(4, 0),
            Err(VecSimError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_error_display() {
        let err = VecSimError::DimensionMismatch {
            expected: 8,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 8, got 2");
    }
}
