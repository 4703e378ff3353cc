//! Validation helper functions for configuration types.

use crate::core::errors::{Result, SpecLensError};

/// Validate that a usize value is greater than zero.
pub fn validate_positive_usize(value: usize, field: &str) -> Result<()> {
    if value == 0 {
        return Err(SpecLensError::validation_field(
            format!("{} must be greater than 0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that a u64 value is greater than zero.
pub fn validate_positive_u64(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(SpecLensError::validation_field(
            format!("{} must be greater than 0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is finite and greater than zero.
pub fn validate_positive_f64(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SpecLensError::validation_field(
            format!("{} must be greater than 0.0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is finite and non-negative.
pub fn validate_non_negative(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SpecLensError::validation_field(
            format!("{} must be non-negative", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is in the unit range [0.0, 1.0].
pub fn validate_unit_range(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SpecLensError::validation_field(
            format!("{} must be between 0.0 and 1.0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that a fraction lies strictly between 0.0 and 1.0.
pub fn validate_open_unit_range(value: f64, field: &str) -> Result<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(SpecLensError::validation_field(
            format!("{} must be strictly between 0.0 and 1.0", field),
            field,
        ));
    }
    Ok(())
}

/// Validate that an inclusive `[lo, hi]` range is well-formed.
pub fn validate_ordered_range<T: PartialOrd + std::fmt::Debug>(
    range: &[T; 2],
    field: &str,
) -> Result<()> {
    if range[0] > range[1] {
        return Err(SpecLensError::validation_field(
            format!(
                "{} lower bound {:?} exceeds upper bound {:?}",
                field, range[0], range[1]
            ),
            field,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_range_accepts_degenerate_interval() {
        assert!(validate_ordered_range(&[3, 3], "int_range").is_ok());
        assert!(validate_ordered_range(&[4, 3], "int_range").is_err());
    }

    #[test]
    fn open_unit_range_rejects_bounds() {
        assert!(validate_open_unit_range(0.0, "f").is_err());
        assert!(validate_open_unit_range(1.0, "f").is_err());
        assert!(validate_open_unit_range(0.3, "f").is_ok());
    }

    #[test]
    fn positive_f64_rejects_nan() {
        assert!(validate_positive_f64(f64::NAN, "learning_rate").is_err());
    }
}
