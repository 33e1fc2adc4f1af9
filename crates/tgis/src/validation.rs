//! Request checks applied before the engine sees a call

use crate::{AdapterConfig, Result, TgisError};
use tgis_core::{DecodingMethod, GenerationParams};

pub const MAX_STOP_SEQUENCES: usize = 6;
pub const MAX_STOP_SEQUENCE_LENGTH: usize = 240;

/// Check the prompt count of a batched call
pub fn validate_batch_size(size: usize, config: &AdapterConfig) -> Result<()> {
    if size > config.max_batch_size {
        return Err(TgisError::Validation(format!(
            "batch size {} exceeds limit of {}",
            size, config.max_batch_size
        )));
    }
    Ok(())
}

/// Check generation parameters and fill in server defaults
pub fn validate_params(
    mut params: GenerationParams,
    config: &AdapterConfig,
) -> Result<GenerationParams> {
    let max_new_tokens = params
        .max_new_tokens
        .unwrap_or(config.default_max_new_tokens);
    if max_new_tokens > config.max_new_tokens_limit {
        return Err(TgisError::Validation(format!(
            "max_new_tokens must be <= {}",
            config.max_new_tokens_limit
        )));
    }
    if params.min_new_tokens > max_new_tokens {
        return Err(TgisError::Validation(
            "min_new_tokens must be <= max_new_tokens".to_string(),
        ));
    }
    params.max_new_tokens = Some(max_new_tokens);

    if params.method == DecodingMethod::Sample {
        if params.temperature.is_nan() || params.temperature < 0.0 {
            return Err(TgisError::Validation(
                "temperature must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&params.top_p) {
            return Err(TgisError::Validation(
                "top_p must be between 0 and 1".to_string(),
            ));
        }
    }

    if params.stop_sequences.len() > MAX_STOP_SEQUENCES {
        return Err(TgisError::Validation(format!(
            "can specify at most {} stop sequences",
            MAX_STOP_SEQUENCES
        )));
    }
    for sequence in &params.stop_sequences {
        if sequence.is_empty() || sequence.chars().count() > MAX_STOP_SEQUENCE_LENGTH {
            return Err(TgisError::Validation(format!(
                "stop sequences must be between 1 and {} characters",
                MAX_STOP_SEQUENCE_LENGTH
            )));
        }
    }

    Ok(params)
}
