//! Reusable field validators
//!
//! Validators run after a field value has been coerced to its declared type.
//! They receive the request key of the field and the coerced value.

use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// A field validator
pub type Validator = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Validator: field is required (not null)
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| {
        if value.is_null() {
            Err(format!("'{}' is required", field))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must be positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("'{}' must be positive (got {})", field, num)),
        // Not a number: another validator will complain
        _ => Ok(()),
    }
}

/// Validator: string length must be within range (in characters)
pub fn string_length(
    min: usize,
    max: usize,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!(
                "'{}' must have at least {} characters (got {})",
                field, min, len
            ))
        } else if len > max {
            Err(format!(
                "'{}' must not exceed {} characters (got {})",
                field, max, len
            ))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must not be below minimum
pub fn min_value(min: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num < min => Err(format!("'{}' must be at least {} (got {})", field, min, num)),
        _ => Ok(()),
    }
}

/// Validator: number must not exceed maximum
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!("'{}' must not exceed {} (got {})", field, max, num)),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list(
    allowed: Vec<String>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        if allowed.iter().any(|a| a == s) {
            Ok(())
        } else {
            Err(format!(
                "'{}' must be one of {:?} (got {})",
                field, allowed, s
            ))
        }
    }
}

/// Validator: date must match format
pub fn date_format(
    format: &'static str,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        chrono::NaiveDate::parse_from_str(s, format)
            .map(|_| ())
            .map_err(|_| format!("'{}' must match date format {} (got {})", field, format, s))
    }
}

/// Validator: string must match the regular expression
pub fn pattern(regex: Regex) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        if regex.is_match(s) {
            Ok(())
        } else {
            Err(format!("'{}' does not match pattern {}", field, regex.as_str()))
        }
    }
}
