//! Typed body models validated with the `validator` crate
//!
//! A `Json` field delivers the raw body as a `serde_json::Value`. Handlers that
//! want a typed struct call [`validate_model`] (or `Arguments::model`), which
//! deserializes and then runs the struct's `#[validate(...)]` rules.

use crate::core::error::{BindResult, FieldValidationError, ValidationError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::{Validate, ValidationErrors};

/// Deserialize `value` into `T` and run its validation rules
pub fn validate_model<T>(value: Value) -> BindResult<T>
where
    T: DeserializeOwned + Validate,
{
    let model: T = serde_json::from_value(value).map_err(|e| {
        ValidationError::Field(FieldValidationError::new("body", "body", e.to_string()))
    })?;
    model
        .validate()
        .map_err(|errors| ValidationError::FieldErrors(field_errors(&errors)))?;
    Ok(model)
}

/// Flatten `validator` errors into field errors, sorted by field name
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldValidationError> {
    let mut out: Vec<FieldValidationError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed '{}' check", e.code));
                FieldValidationError::new(field.clone(), "body", message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}
