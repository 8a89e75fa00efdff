//! Configuration validation.

use crate::config::{Config, InferenceConfig};
use crate::constants::{MAX_BATCH_SIZE, calibration, probability};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_inference(&config.inference)?;

    if config.catalog.default_variant.is_some() && config.catalog.default_species.is_none() {
        return Err(Error::ConfigValidation {
            message: "catalog.default_variant requires catalog.default_species".to_string(),
        });
    }

    if config.output.formats.is_empty() {
        return Err(Error::ConfigValidation {
            message: "output.formats must name at least one format".to_string(),
        });
    }

    Ok(())
}

/// Validate inference settings.
///
/// Also used on the effective settings after CLI overrides are applied.
pub fn validate_inference(inference: &InferenceConfig) -> Result<()> {
    validate_probability("confidence_threshold", inference.confidence_threshold)?;
    validate_probability("margin_threshold", inference.margin_threshold)?;

    if inference.image_size == 0 {
        return Err(Error::ConfigValidation {
            message: "image_size must be at least 1".to_string(),
        });
    }

    if inference.batch_size > MAX_BATCH_SIZE {
        return Err(Error::ConfigValidation {
            message: format!(
                "batch_size must be at most {MAX_BATCH_SIZE}, got {}",
                inference.batch_size
            ),
        });
    }

    if let Some(t) = inference.temperature
        && !(t.is_finite() && t >= calibration::MIN_TEMPERATURE)
    {
        return Err(Error::ConfigValidation {
            message: format!(
                "temperature must be at least {}, got {t}",
                calibration::MIN_TEMPERATURE
            ),
        });
    }

    if inference.intra_threads == Some(0) {
        return Err(Error::ConfigValidation {
            message: "intra_threads must be at least 1 when set".to_string(),
        });
    }

    Ok(())
}

fn validate_probability(name: &str, value: f32) -> Result<()> {
    if (probability::MIN..=probability::MAX).contains(&value) {
        Ok(())
    } else {
        Err(Error::ConfigValidation {
            message: format!(
                "{name} must be between {} and {}, got {value}",
                probability::MIN,
                probability::MAX
            ),
        })
    }
}
