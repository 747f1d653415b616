//! Error types for the domain layer.

use thiserror::Error;

/// Errors that occur during value object construction and config validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: f64,
        max: f64,
        actual: f64,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Duplicate value '{value}' in field '{field}'")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates an out of range validation error.
    pub fn out_of_range(field: impl Into<String>, min: f64, max: f64, actual: f64) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate value validation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        ValidationError::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_field() {
        let err = ValidationError::empty_field("name");
        assert_eq!(err.to_string(), "Field 'name' cannot be empty");

        let err = ValidationError::out_of_range("min_confidence", 0.0, 1.0, 1.5);
        assert_eq!(
            err.to_string(),
            "Field 'min_confidence' must be between 0 and 1, got 1.5"
        );
    }
}
