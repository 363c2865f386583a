//! Payload validation against the configured JSON Schema.

use serde_json::Value;
use tracing::debug;

use crate::error::{DecodeError, SchemaViolation};
use crate::options::DecoderOptions;

/// Validate a decoded payload against the schema configured in `options`.
///
/// A no-op unless validation is enabled.
///
/// # Errors
///
/// Returns `DecodeError::MissingCompiler` if validation is enabled without a
/// compiler, `DecodeError::SchemaLoad` if the schema can't be compiled, or
/// `DecodeError::Invalid` if the payload doesn't match the schema.
pub fn validate_payload(payload: &Value, options: &DecoderOptions) -> Result<(), DecodeError> {
    if !options.validate {
        return Ok(());
    }

    let compiler = options
        .compiler
        .as_ref()
        .ok_or(DecodeError::MissingCompiler)?;

    let schema =
        compiler
            .compile(&options.schema_ref)
            .map_err(|source| DecodeError::SchemaLoad {
                reference: options.schema_ref.clone(),
                source,
            })?;

    schema.validate(payload).map_err(|errors| {
        debug!(
            reference = %options.schema_ref,
            errors = errors.len(),
            "payload failed JSON Schema validation"
        );
        DecodeError::Invalid { errors }
    })
}

/// Run `validator` over `payload` and collect every violation.
pub fn collect_violations(
    validator: &jsonschema::Validator,
    payload: &Value,
) -> Vec<SchemaViolation> {
    validator
        .iter_errors(payload)
        .map(|e| SchemaViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect()
}
