//! CLI argument validators.
//!
//! Shared validation functions for CLI argument parsing.

use crate::constants::{MAX_BATCH_SIZE, calibration};

/// Parse and validate a probability value (0.0-1.0).
pub fn parse_probability(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!("value must be between 0.0 and 1.0, got {value}"));
    }

    Ok(value)
}

/// Parse and validate a bounded float value.
///
/// # Arguments
///
/// * `s` - The string to parse
/// * `min` - Minimum allowed value (inclusive)
/// * `max` - Maximum allowed value (inclusive)
/// * `name` - Name of the parameter for error messages
pub fn parse_bounded_float(s: &str, min: f64, max: f64, name: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(min..=max).contains(&value) {
        return Err(format!(
            "{name} must be between {min} and {max}, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a calibration temperature (at least 0.05).
pub fn parse_temperature(s: &str) -> Result<f64, String> {
    parse_bounded_float(s, calibration::MIN_TEMPERATURE, f64::MAX, "temperature")
}

/// Parse an inference batch size (0 = one combined batch).
pub fn parse_batch_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid batch size"))?;

    if value > MAX_BATCH_SIZE {
        return Err(format!(
            "batch size must be at most {MAX_BATCH_SIZE}, got {value}"
        ));
    }

    Ok(value)
}
