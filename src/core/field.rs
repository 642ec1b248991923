//! Field descriptors
//!
//! A [`Field`] declares where a handler argument comes from (query, header,
//! cookie, path, form, body, file), which type it is coerced to, its default,
//! and how it is validated. The same descriptor feeds the OpenAPI generator.
//!
//! ```rust,ignore
//! let page = Field::query()
//!     .of_type(FieldType::Integer)
//!     .default(json!(1))
//!     .validator(validators::min_value(1.0))
//!     .description("Page number");
//! ```

use crate::core::error::{BindError, BindResult, ConfigError, FieldValidationError};
use crate::core::request::RequestAdapter;
use crate::core::validation::{Filter, Validator};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use http::HeaderName;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Where a field's value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Query,
    MultiQuery,
    Header,
    Cookie,
    Path,
    Form,
    MultiForm,
    File,
    /// One top-level key of a JSON object body
    Body,
    /// The whole JSON body
    Json,
}

impl FieldKind {
    /// OpenAPI parameter location, `None` for request-body kinds
    pub fn parameter_location(&self) -> Option<&'static str> {
        match self {
            FieldKind::Query | FieldKind::MultiQuery => Some("query"),
            FieldKind::Header => Some("header"),
            FieldKind::Cookie => Some("cookie"),
            FieldKind::Path => Some("path"),
            _ => None,
        }
    }

    pub fn is_form(&self) -> bool {
        matches!(self, FieldKind::Form | FieldKind::MultiForm | FieldKind::File)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, FieldKind::Body | FieldKind::Json)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Query => "query",
            FieldKind::MultiQuery => "multiquery",
            FieldKind::Header => "header",
            FieldKind::Cookie => "cookie",
            FieldKind::Path => "path",
            FieldKind::Form => "form",
            FieldKind::MultiForm => "multiform",
            FieldKind::File => "file",
            FieldKind::Body => "body",
            FieldKind::Json => "json",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type a raw value is coerced to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    Date,
    Array(Box<FieldType>),
    Object,
    Any,
}

impl FieldType {
    /// Coerce a raw value (usually a string from the query, a header or a
    /// form) into this type
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match self {
            FieldType::Any => Ok(value),
            FieldType::String => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err("value is not a valid string".to_string()),
            },
            FieldType::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|i| json!(i))
                    .map_err(|_| "value is not a valid integer".to_string()),
                _ => Err("value is not a valid integer".to_string()),
            },
            FieldType::Float => match &value {
                Value::Number(_) => Ok(value),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| json!(f))
                    .ok_or_else(|| "value is not a valid float".to_string()),
                _ => Err("value is not a valid float".to_string()),
            },
            FieldType::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
                Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                    _ => Err("value could not be parsed to a boolean".to_string()),
                },
                _ => Err("value could not be parsed to a boolean".to_string()),
            },
            FieldType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .map(|u| Value::String(u.to_string()))
                .ok_or_else(|| "value is not a valid uuid".to_string()),
            FieldType::DateTime => match &value {
                Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| json!(dt.with_timezone(&Utc)))
                    .map_err(|_| "value is not a valid datetime".to_string()),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                    .map(|dt| json!(dt))
                    .ok_or_else(|| "value is not a valid datetime".to_string()),
                _ => Err("value is not a valid datetime".to_string()),
            },
            FieldType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .map(|d| json!(d))
                .ok_or_else(|| "value is not a valid date".to_string()),
            FieldType::Array(inner) => {
                let items = match value {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    single => vec![single],
                };
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| inner.coerce(item).map_err(|e| format!("item {}: {}", i, e)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            FieldType::Object => match value {
                Value::Object(_) => Ok(value),
                Value::String(s) => match serde_json::from_str::<Value>(&s) {
                    Ok(parsed @ Value::Object(_)) => Ok(parsed),
                    _ => Err("value is not a valid object".to_string()),
                },
                _ => Err("value is not a valid object".to_string()),
            },
        }
    }

    /// OpenAPI `(type, format)` pair
    pub fn schema_type(&self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            FieldType::String => (Some("string"), None),
            FieldType::Integer => (Some("integer"), Some("int64")),
            FieldType::Float => (Some("number"), Some("double")),
            FieldType::Boolean => (Some("boolean"), None),
            FieldType::Uuid => (Some("string"), Some("uuid")),
            FieldType::DateTime => (Some("string"), Some("date-time")),
            FieldType::Date => (Some("string"), Some("date")),
            FieldType::Array(_) => (Some("array"), None),
            FieldType::Object => (Some("object"), None),
            FieldType::Any => (None, None),
        }
    }

    /// Short name used in signatures
    pub fn name(&self) -> String {
        match self {
            FieldType::Array(inner) => format!("array<{}>", inner.name()),
            other => other.schema_type().0.unwrap_or("any").to_string()
                + match other {
                    FieldType::Uuid => ":uuid",
                    FieldType::DateTime => ":date-time",
                    FieldType::Date => ":date",
                    _ => "",
                },
        }
    }
}

/// String format checked after coercion
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Uuid,
    Url,
    Phone,
    Custom(Regex),
}

impl FieldFormat {
    /// Validate a field value against this format
    pub fn validate(&self, value: &Value) -> bool {
        let Some(string_value) = value.as_str() else {
            return false;
        };

        match self {
            FieldFormat::Email => Self::is_valid_email(string_value),
            FieldFormat::Uuid => Uuid::parse_str(string_value).is_ok(),
            FieldFormat::Url => Self::is_valid_url(string_value),
            FieldFormat::Phone => Self::is_valid_phone(string_value),
            FieldFormat::Custom(regex) => regex.is_match(string_value),
        }
    }

    /// OpenAPI `format` keyword, if the format has one
    pub fn openapi_format(&self) -> Option<&'static str> {
        match self {
            FieldFormat::Email => Some("email"),
            FieldFormat::Uuid => Some("uuid"),
            FieldFormat::Url => Some("uri"),
            FieldFormat::Phone | FieldFormat::Custom(_) => None,
        }
    }

    /// OpenAPI `pattern` keyword for custom formats
    pub fn openapi_pattern(&self) -> Option<String> {
        match self {
            FieldFormat::Custom(regex) => Some(regex.as_str().to_string()),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldFormat::Email => "email",
            FieldFormat::Uuid => "uuid",
            FieldFormat::Url => "url",
            FieldFormat::Phone => "phone",
            FieldFormat::Custom(_) => "pattern",
        }
    }

    fn is_valid_email(email: &str) -> bool {
        static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = EMAIL_REGEX.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
        });
        regex.is_match(email)
    }

    fn is_valid_url(url: &str) -> bool {
        static URL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = URL_REGEX.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap());
        regex.is_match(url)
    }

    fn is_valid_phone(phone: &str) -> bool {
        static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
        // At least 8 digits, max 15 (E.164)
        let regex = PHONE_REGEX.get_or_init(|| Regex::new(r"^\+?[1-9]\d{7,14}$").unwrap());
        regex.is_match(phone)
    }
}

/// Called with the request key when a field is absent; its error replaces
/// the default "field required" validation error
pub type NotFoundHook = Arc<dyn Fn(&str) -> BindError + Send + Sync>;

/// Declarative description of one handler argument
#[derive(Clone)]
pub struct Field {
    kind: FieldKind,
    alias: Option<String>,
    field_type: FieldType,
    default: Option<Value>,
    description: Option<String>,
    example: Option<Value>,
    format: Option<FieldFormat>,
    validators: Vec<Validator>,
    filters: Vec<Filter>,
    not_found: Option<NotFoundHook>,
    include_in_schema: bool,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("alias", &self.alias)
            .field("field_type", &self.field_type)
            .field("default", &self.default)
            .field("format", &self.format)
            .field("validators", &self.validators.len())
            .field("filters", &self.filters.len())
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        let field_type = match kind {
            FieldKind::MultiQuery | FieldKind::MultiForm => {
                FieldType::Array(Box::new(FieldType::String))
            }
            FieldKind::Body | FieldKind::Json | FieldKind::File => FieldType::Any,
            _ => FieldType::String,
        };
        Self {
            kind,
            alias: None,
            field_type,
            default: None,
            description: None,
            example: None,
            format: None,
            validators: Vec::new(),
            filters: Vec::new(),
            not_found: None,
            include_in_schema: true,
        }
    }

    pub fn query() -> Self {
        Self::new(FieldKind::Query)
    }

    pub fn multiquery() -> Self {
        Self::new(FieldKind::MultiQuery)
    }

    pub fn header() -> Self {
        Self::new(FieldKind::Header)
    }

    pub fn cookie() -> Self {
        Self::new(FieldKind::Cookie)
    }

    pub fn path() -> Self {
        Self::new(FieldKind::Path)
    }

    pub fn form() -> Self {
        Self::new(FieldKind::Form)
    }

    pub fn multiform() -> Self {
        Self::new(FieldKind::MultiForm)
    }

    pub fn file() -> Self {
        Self::new(FieldKind::File)
    }

    pub fn body() -> Self {
        Self::new(FieldKind::Body)
    }

    pub fn json() -> Self {
        Self::new(FieldKind::Json)
    }

    // === Builder ===

    /// Read the value under another key than the parameter name
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn of_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Value used when the request does not carry the field; makes it optional
    pub fn default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Shorthand for `default(Value::Null)`
    pub fn optional(self) -> Self {
        self.default(Value::Null)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Replace the "field required" error with a custom one
    pub fn on_missing<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> BindError + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(hook));
        self
    }

    /// Keep the field out of the generated OpenAPI document
    pub fn hidden(mut self) -> Self {
        self.include_in_schema = false;
        self
    }

    // === One-time binding ===

    /// Bind an alias on a field that must not already carry one
    pub fn bind_alias(&mut self, alias: impl Into<String>) -> Result<(), ConfigError> {
        if let Some(existing) = &self.alias {
            return Err(ConfigError::AliasAlreadyBound {
                alias: existing.clone(),
            });
        }
        self.alias = Some(alias.into());
        Ok(())
    }

    /// Bind a missing-value hook on a field that must not already carry one
    pub fn bind_not_found(&mut self, hook: NotFoundHook) -> Result<(), ConfigError> {
        if self.not_found.is_some() {
            return Err(ConfigError::NotFoundHookAlreadyBound);
        }
        self.not_found = Some(hook);
        Ok(())
    }

    pub(crate) fn set_default(&mut self, default: Value) {
        self.default = Some(default);
    }

    // === Accessors ===

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn example_value(&self) -> Option<&Value> {
        self.example.as_ref()
    }

    pub fn field_format(&self) -> Option<&FieldFormat> {
        self.format.as_ref()
    }

    pub fn has_not_found_hook(&self) -> bool {
        self.not_found.is_some()
    }

    pub fn include_in_schema(&self) -> bool {
        self.include_in_schema
    }

    /// A field is required unless it has a default. Path fields always are.
    pub fn is_required(&self) -> bool {
        self.kind == FieldKind::Path || self.default.is_none()
    }

    /// Request key for a parameter of the given name
    pub fn key<'a>(&'a self, param_name: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(param_name)
    }

    // === Extraction ===

    /// Read, coerce, filter and validate the value for `param_name`
    pub fn extract(&self, param_name: &str, request: &dyn RequestAdapter) -> BindResult<Value> {
        let key = self.key(param_name);
        let invalid =
            |message: String| BindError::from(FieldValidationError::new(key, self.kind.as_str(), message));

        let raw = match self.raw_value(key, request)? {
            Some(raw) => raw,
            None => {
                if let Some(hook) = &self.not_found {
                    return Err(hook(key));
                }
                return match &self.default {
                    Some(default) => Ok(default.clone()),
                    None => Err(invalid("field required".to_string())),
                };
            }
        };

        let mut value = self.field_type.coerce(raw).map_err(invalid)?;

        for filter in &self.filters {
            value = filter(key, value).map_err(|e| invalid(e.to_string()))?;
        }

        if let Some(format) = &self.format {
            if !format.validate(&value) {
                return Err(invalid(format!("value is not a valid {}", format.name())));
            }
        }

        for validator in &self.validators {
            validator(key, &value).map_err(invalid)?;
        }

        Ok(value)
    }

    fn raw_value(&self, key: &str, request: &dyn RequestAdapter) -> BindResult<Option<Value>> {
        let raw = match self.kind {
            FieldKind::Query => request.query().get(key).cloned().map(Value::String),
            FieldKind::MultiQuery => request.multiquery().get(key).map(|v| json!(v)),
            FieldKind::Header => header_value(key, request).map_err(|message| {
                BindError::from(FieldValidationError::new(key, "header", message))
            })?,
            FieldKind::Cookie => request.cookie().get(key).cloned().map(Value::String),
            FieldKind::Path => request.path().get(key).cloned().map(Value::String),
            FieldKind::Form => request.form()?.get(key).cloned().map(Value::String),
            FieldKind::MultiForm => request.multiform()?.get(key).map(|v| json!(v)),
            FieldKind::File => match request.file()?.get(key) {
                Some(files) if files.len() == 1 => Some(serde_json::to_value(&files[0])?),
                Some(files) => Some(serde_json::to_value(files)?),
                None => None,
            },
            FieldKind::Body => match request.body()? {
                Value::Object(map) => map.get(key).cloned().filter(|v| !v.is_null()),
                _ => {
                    return Err(FieldValidationError::new(
                        key,
                        "body",
                        "request body is not a JSON object",
                    )
                    .into());
                }
            },
            FieldKind::Json => Some(request.body()?.clone()),
        };
        Ok(raw)
    }
}

/// Header lookup; names with `_` also match their `-` spelling
fn header_value(key: &str, request: &dyn RequestAdapter) -> Result<Option<Value>, String> {
    let headers = request.header();
    let mut candidates = vec![key.to_string()];
    if key.contains('_') {
        candidates.push(key.replace('_', "-"));
    }
    for candidate in candidates {
        let Ok(name) = HeaderName::from_bytes(candidate.as_bytes()) else {
            continue;
        };
        if let Some(value) = headers.get(&name) {
            return value
                .to_str()
                .map(|s| Some(Value::String(s.to_string())))
                .map_err(|_| "header value is not valid UTF-8".to_string());
        }
    }
    Ok(None)
}
