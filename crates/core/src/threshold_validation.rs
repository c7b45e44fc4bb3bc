//! Range checks for configuration thresholds.
//!
//! Used by `PipelineConfig::validate`; each helper names the offending
//! field in its `CoreError::Validation` message.

use crate::error::CoreError;

/// Validate that a value falls within `[0.0, 1.0]`.
///
/// Returns a `CoreError::Validation` naming the field if out of range.
pub fn validate_unit_range(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that a value is finite and strictly positive.
pub fn validate_positive(value: f64, name: &str) -> Result<(), CoreError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::Validation(format!(
            "{name} must be > 0, got {value}"
        )));
    }
    Ok(())
}

/// Validate that an angular tolerance lies in `[0, 90]` degrees.
pub fn validate_tolerance_deg(value: f64, name: &str) -> Result<(), CoreError> {
    if !(0.0..=90.0).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{name} must be between 0 and 90 degrees, got {value}"
        )));
    }
    Ok(())
}
