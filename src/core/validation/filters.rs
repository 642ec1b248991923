//! Reusable field filters
//!
//! Filters transform a coerced field value before validators run.

use anyhow::Result;
use serde_json::{Value, json};
use std::sync::Arc;

/// A field filter
pub type Filter = Arc<dyn Fn(&str, Value) -> Result<Value> + Send + Sync>;

/// Filter: trim whitespace from string
pub fn trim() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.trim().to_string())),
        None => Ok(value),
    }
}

/// Filter: convert string to uppercase
pub fn uppercase() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.to_uppercase())),
        None => Ok(value),
    }
}

/// Filter: convert string to lowercase
pub fn lowercase() -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    |_: &str, value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.to_lowercase())),
        None => Ok(value),
    }
}

/// Filter: round number to specified decimal places
///
/// Integers pass through unchanged.
pub fn round_decimals(
    decimals: u32,
) -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    move |_: &str, value: Value| match value.as_f64() {
        Some(num) if value.is_f64() => {
            let factor = 10_f64.powi(decimals as i32);
            Ok(json!((num * factor).round() / factor))
        }
        _ => Ok(value),
    }
}
