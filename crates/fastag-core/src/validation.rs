//! # Validation Module
//!
//! Input validation for the inventory engines.
//!
//! Every mutating engine validates its inputs with these helpers BEFORE
//! issuing the first storage statement, so a validation failure never leaves
//! partial state behind.
//!
//! ## Usage
//! ```rust
//! use fastag_core::validation::{validate_serial, validate_serials};
//!
//! validate_serial("608268-001-0046785").unwrap();
//! assert!(validate_serials(&[]).is_err());
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::types::{OwnerRef, TransferRequest};

/// Maximum accepted serial length.
pub const MAX_SERIAL_LEN: usize = 64;

// =============================================================================
// Serial Validators
// =============================================================================

/// Validates a tag serial (barcode string).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 64 characters
/// - Letters, digits, hyphens, underscores and dots only
pub fn validate_serial(serial: &str) -> ValidationResult<()> {
    let serial = serial.trim();

    if serial.is_empty() {
        return Err(ValidationError::required("tag_serial"));
    }

    if serial.len() > MAX_SERIAL_LEN {
        return Err(ValidationError::TooLong {
            field: "tag_serial".to_string(),
            max: MAX_SERIAL_LEN,
        });
    }

    if !serial
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::invalid_format(
            "tag_serial",
            "must contain only letters, numbers, hyphens, underscores, and dots",
        ));
    }

    Ok(())
}

/// Validates a serial list: non-empty, each entry well-formed.
pub fn validate_serials(serials: &[String]) -> ValidationResult<()> {
    if serials.is_empty() {
        return Err(ValidationError::required("tag_serials"));
    }
    for serial in serials {
        validate_serial(serial)?;
    }
    Ok(())
}

// =============================================================================
// Transfer Validators
// =============================================================================

/// Validates the scoping fields of a single class+batch transfer.
pub fn validate_transfer_scope(fastag_class: &str, batch_number: &str) -> ValidationResult<()> {
    if fastag_class.trim().is_empty() {
        return Err(ValidationError::required("fastag_class"));
    }
    if batch_number.trim().is_empty() {
        return Err(ValidationError::required("batch_number"));
    }
    Ok(())
}

/// Validates one bulk-transfer entry and resolves its owner endpoints.
///
/// Owner ids must be numeric or the "admin" sentinel; the serial list must be
/// non-empty. Returns `(from, to)` on success.
pub fn validate_transfer_request(
    request: &TransferRequest,
) -> ValidationResult<(OwnerRef, OwnerRef)> {
    let from = OwnerRef::parse_field("from_owner", &request.from_owner)?;
    let to = OwnerRef::parse_field("to_owner", &request.to_owner)?;
    validate_serials(&request.tag_serials)?;
    Ok((from, to))
}
