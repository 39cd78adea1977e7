//! # Error Types
//!
//! Domain-specific error types for fastag-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fastag-core errors (this file)                                        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  fastag-db errors (separate crate)                                     │
//! │  └── DbError          - Not-found / conflict / storage failures        │
//! │                                                                         │
//! │  Flow: ValidationError → DbError → caller (API layer, automation)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (serial, field name, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

/// Input validation errors.
///
/// These errors occur before any storage statement is issued, so a failed
/// validation never leaves partial state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (bad serial charset, non-numeric owner id, etc.).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// An owner id that is neither numeric nor the "admin" sentinel.
    #[error("{field} must be a numeric user id or 'admin', got '{value}'")]
    InvalidOwner { field: String, value: String },
}

impl ValidationError {
    /// Creates a Required error for the given field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates an InvalidFormat error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::required("tag_serials");
        assert_eq!(err.to_string(), "tag_serials is required");

        let err = ValidationError::InvalidOwner {
            field: "from_owner".to_string(),
            value: "warehouse".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "from_owner must be a numeric user id or 'admin', got 'warehouse'"
        );
    }
}
